use crate::config::{Settings, DEFAULT_DATA_DIR};
use crate::domain::dataset::{PortfolioDataset, Row};
use crate::domain::recommendation::{
    AllInvestorsStocks, InvestorStockRecommendations, SingleAction, StockRecommendation,
    UserRecommendation, UserStockRecommendations,
};
use crate::error::Result;
use crate::ingest;
use crate::llm::{
    classifier_for, ChatCompletionsClient, Classifier, CompletionClient, SentimentSplit,
};
use crate::prompt::{build_prompt, PromptScope};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Drives prompt building, LLM calls and classification for the four recommendation modes.
///
/// Calls are dispatched in enumeration order (dataset, then row) with at most `concurrency`
/// in flight, and results always come back in that order. The first failed call aborts the
/// whole invocation; no partial results are returned.
#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn CompletionClient>,
    classifier: Arc<dyn Classifier>,
    action_rule: SentimentSplit,
    concurrency: usize,
    data_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn CompletionClient>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            llm,
            classifier,
            action_rule: SentimentSplit,
            concurrency: 1,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let llm = ChatCompletionsClient::from_settings(settings)?;
        Ok(Self::new(Arc::new(llm), classifier_for(settings.matcher))
            .with_concurrency(settings.llm_concurrency)
            .with_data_dir(&settings.data_dir))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Market-wide buy/sell call from the news alone. Portfolio data is not consulted.
    pub async fn single_action(
        &self,
        _datasets: &[PortfolioDataset],
        news: &str,
    ) -> Result<SingleAction> {
        let started = Instant::now();
        let news_impact = self.llm.complete(&build_prompt(PromptScope::Global, news)).await?;
        let action = self.action_rule.classify(&news_impact);

        tracing::info!(
            mode = "single",
            model = self.llm.model(),
            %action,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "computed single action"
        );
        Ok(SingleAction {
            action,
            news_impact,
        })
    }

    /// One call per dataset, in dataset order.
    pub async fn per_user(
        &self,
        datasets: &[PortfolioDataset],
        news: &str,
    ) -> Result<Vec<UserRecommendation>> {
        let started = Instant::now();
        let prompts = datasets
            .iter()
            .map(|dataset| build_prompt(PromptScope::PerUser { dataset }, news))
            .collect();
        let replies = self.complete_all(prompts).await?;

        let out: Vec<UserRecommendation> = datasets
            .iter()
            .zip(replies)
            .map(|(dataset, reply)| UserRecommendation {
                user_file: dataset.identifier.clone(),
                recommendation: self.classifier.classify(&reply),
                llm_analysis: reply,
            })
            .collect();

        tracing::info!(
            mode = "per_user",
            model = self.llm.model(),
            classifier = self.classifier.name(),
            datasets = datasets.len(),
            calls = out.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "computed per-user recommendations"
        );
        Ok(out)
    }

    /// One call per row per dataset.
    pub async fn per_stock(
        &self,
        datasets: &[PortfolioDataset],
        news: &str,
    ) -> Result<Vec<UserStockRecommendations>> {
        let started = Instant::now();
        let grouped = self
            .stock_fan_out(datasets, news, |user, _stock, row| PromptScope::PerStock {
                user,
                row,
            })
            .await?;

        let out: Vec<UserStockRecommendations> = grouped
            .into_iter()
            .map(|(user_file, stocks)| UserStockRecommendations { user_file, stocks })
            .collect();

        tracing::info!(
            mode = "per_stock",
            model = self.llm.model(),
            classifier = self.classifier.name(),
            datasets = datasets.len(),
            calls = out.iter().map(|u| u.stocks.len()).sum::<usize>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "computed per-stock recommendations"
        );
        Ok(out)
    }

    /// Same fan-out as [`Orchestrator::per_stock`], keyed by investor.
    pub async fn all_investors_stocks(
        &self,
        datasets: &[PortfolioDataset],
        news: &str,
    ) -> Result<AllInvestorsStocks> {
        let started = Instant::now();
        let grouped = self
            .stock_fan_out(datasets, news, |investor, stock, row| PromptScope::All {
                investor,
                stock,
                row,
            })
            .await?;

        let out = AllInvestorsStocks {
            all_investors_stock_recommendations: grouped
                .into_iter()
                .map(|(investor, stocks)| InvestorStockRecommendations { investor, stocks })
                .collect(),
        };

        tracing::info!(
            mode = "all",
            model = self.llm.model(),
            classifier = self.classifier.name(),
            datasets = datasets.len(),
            calls = out
                .all_investors_stock_recommendations
                .iter()
                .map(|i| i.stocks.len())
                .sum::<usize>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "computed all-investor stock recommendations"
        );
        Ok(out)
    }

    pub async fn compute_single_action(&self) -> Result<SingleAction> {
        let inputs = ingest::load_inputs(&self.data_dir).await?;
        self.single_action(&inputs.portfolios, &inputs.news).await
    }

    pub async fn compute_per_user(&self) -> Result<Vec<UserRecommendation>> {
        let inputs = ingest::load_inputs(&self.data_dir).await?;
        self.per_user(&inputs.portfolios, &inputs.news).await
    }

    pub async fn compute_per_stock(&self) -> Result<Vec<UserStockRecommendations>> {
        let inputs = ingest::load_inputs(&self.data_dir).await?;
        self.per_stock(&inputs.portfolios, &inputs.news).await
    }

    pub async fn compute_all_investors_stocks(&self) -> Result<AllInvestorsStocks> {
        let inputs = ingest::load_inputs(&self.data_dir).await?;
        self.all_investors_stocks(&inputs.portfolios, &inputs.news).await
    }

    /// Builds one prompt per row, completes them all and regroups the results by dataset.
    async fn stock_fan_out<F>(
        &self,
        datasets: &[PortfolioDataset],
        news: &str,
        scope: F,
    ) -> Result<Vec<(String, Vec<StockRecommendation>)>>
    where
        F: for<'a> Fn(&'a str, &'a str, &'a Row) -> PromptScope<'a>,
    {
        let mut labels = Vec::new();
        let mut prompts = Vec::new();
        for dataset in datasets {
            for (position, row) in dataset.rows.iter().enumerate() {
                let stock = row.stock_label(position);
                let prompt_scope = scope(dataset.identifier.as_str(), stock.as_str(), row);
                tracing::debug!(
                    granularity = ?prompt_scope.granularity(),
                    user = %dataset.identifier,
                    %stock,
                    "built stock prompt"
                );
                prompts.push(build_prompt(prompt_scope, news));
                labels.push(stock);
            }
        }

        let replies = self.complete_all(prompts).await?;
        let mut records = labels
            .into_iter()
            .zip(replies)
            .map(|(stock, reply)| StockRecommendation {
                stock,
                recommendation: self.classifier.classify(&reply),
                llm_analysis: reply,
            });

        Ok(datasets
            .iter()
            .map(|dataset| {
                let stocks = records.by_ref().take(dataset.row_count()).collect();
                (dataset.identifier.clone(), stocks)
            })
            .collect())
    }

    /// Completes every prompt with bounded concurrency, preserving input order.
    async fn complete_all(&self, prompts: Vec<String>) -> Result<Vec<String>> {
        futures::stream::iter(prompts)
            .map(|prompt| async move { self.llm.complete(&prompt).await })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}
