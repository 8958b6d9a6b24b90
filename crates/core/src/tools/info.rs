//! MCP tool server exposing the information lookups to agents.

use super::lookup::LookupClient;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const WEB_SEARCH: &str = "web_search";
pub const SEARCH_PAPERS: &str = "search_papers";
pub const TOP_NEWS: &str = "top_news";
pub const STOCK_QUOTE: &str = "stock_quote";

/// Every tool name an agent descriptor may reference.
pub const KNOWN_TOOLS: [&str; 4] = [WEB_SEARCH, SEARCH_PAPERS, TOP_NEWS, STOCK_QUOTE];

fn default_max_results() -> usize {
    5
}

#[derive(Deserialize, Serialize, JsonSchema, Debug)]
pub struct SearchArgs {
    /// What to search for.
    pub query: String,
    #[schemars(description = "Maximum number of results to return (1-10)")]
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Deserialize, Serialize, JsonSchema, Debug)]
pub struct TopNewsArgs {
    #[schemars(description = "Number of top stories to return (1-10)")]
    #[serde(default = "default_max_results")]
    pub count: usize,
}

#[derive(Deserialize, Serialize, JsonSchema, Debug)]
pub struct StockQuoteArgs {
    #[schemars(description = "Ticker symbol, e.g. 'AAPL' or 'MSFT'")]
    pub symbol: String,
}

/// Read-only lookup tools served over MCP.
pub struct InfoTools {
    lookup: LookupClient,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for InfoTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Read-only lookups: web search, academic papers, top news and stock quotes."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[tool_router]
impl InfoTools {
    pub fn new(lookup: LookupClient) -> Self {
        Self {
            lookup,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Search the web for current information. Returns titles, URLs and snippets.")]
    pub async fn web_search(&self, args: Parameters<SearchArgs>) -> Result<String, String> {
        info!(query = %args.0.query, "Executing tool 'web_search'");
        let hits = self
            .lookup
            .web_search(&args.0.query, args.0.max_results)
            .await
            .map_err(|e| format!("Web search failed: {e:#}"))?;
        to_json(&hits)
    }

    #[tool(description = "Search academic papers by keyword. Returns titles, authors, year, URL and abstract.")]
    pub async fn search_papers(&self, args: Parameters<SearchArgs>) -> Result<String, String> {
        info!(query = %args.0.query, "Executing tool 'search_papers'");
        let papers = self
            .lookup
            .search_papers(&args.0.query, args.0.max_results)
            .await
            .map_err(|e| format!("Paper search failed: {e:#}"))?;
        to_json(&papers)
    }

    #[tool(description = "List the current top stories on Hacker News.")]
    pub async fn top_news(&self, args: Parameters<TopNewsArgs>) -> Result<String, String> {
        info!(count = args.0.count, "Executing tool 'top_news'");
        let stories = self
            .lookup
            .top_news(args.0.count)
            .await
            .map_err(|e| format!("News lookup failed: {e:#}"))?;
        to_json(&stories)
    }

    #[tool(description = "Get the latest price of a stock by ticker symbol.")]
    pub async fn stock_quote(&self, args: Parameters<StockQuoteArgs>) -> Result<String, String> {
        info!(symbol = %args.0.symbol, "Executing tool 'stock_quote'");
        let quote = self
            .lookup
            .stock_quote(&args.0.symbol)
            .await
            .map_err(|e| format!("Quote lookup failed: {e:#}"))?;
        to_json(&quote)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Failed to serialize tool result: {e}"))
}
