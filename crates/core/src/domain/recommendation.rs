use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Sell,
    Hold,
}

impl Recommendation {
    /// Scan order used when a reply mentions more than one label.
    pub const PRIORITY: [Recommendation; 3] = [
        Recommendation::Buy,
        Recommendation::Sell,
        Recommendation::Hold,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Buy => "buy",
            Recommendation::Sell => "sell",
            Recommendation::Hold => "hold",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market-wide call derived from the news alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleAction {
    pub action: Recommendation,
    pub news_impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecommendation {
    pub user_file: String,
    pub recommendation: Recommendation,
    pub llm_analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecommendation {
    pub stock: String,
    pub recommendation: Recommendation,
    pub llm_analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStockRecommendations {
    pub user_file: String,
    pub stocks: Vec<StockRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorStockRecommendations {
    pub investor: String,
    pub stocks: Vec<StockRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllInvestorsStocks {
    pub all_investors_stock_recommendations: Vec<InvestorStockRecommendations>,
}
