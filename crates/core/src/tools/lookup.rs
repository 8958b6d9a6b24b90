//! Read-only information lookups backing the agent tools.
//!
//! Each lookup is split into an HTTP fetch on [`LookupClient`] and a pure
//! `parse_*` function so the response handling can be tested without network
//! access.

use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const SEMANTIC_SCHOLAR_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const HACKER_NEWS_URL: &str = "https://hacker-news.firebaseio.com/v0";
const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Upper bound on results any single lookup returns to the model.
pub const MAX_RESULTS: usize = 10;

/// A single web search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// An academic paper summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<u32>,
    pub url: Option<String>,
    pub summary: Option<String>,
}

/// A Hacker News story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsStory {
    pub title: String,
    pub url: Option<String>,
    #[serde(default)]
    pub score: u32,
    #[serde(rename(deserialize = "by"), default)]
    pub author: String,
}

/// A delayed market quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockQuote {
    pub symbol: String,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub change_percent: Option<f64>,
}

/// HTTP client shared by all lookups.
#[derive(Clone)]
pub struct LookupClient {
    http: Client,
}

impl Default for LookupClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupClient {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent(concat!("teamchat/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Falling back to a default HTTP client without timeout");
                    Client::new()
                }),
        }
    }

    pub async fn web_search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        debug!(%query, "DuckDuckGo lookup");
        let body = self
            .http
            .get(DUCKDUCKGO_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .context("DuckDuckGo request failed")?
            .error_for_status()?
            .text()
            .await?;
        parse_web_search(&body, clamp(max_results))
    }

    pub async fn search_papers(&self, query: &str, max_results: usize) -> Result<Vec<Paper>> {
        debug!(%query, "Semantic Scholar lookup");
        let limit = clamp(max_results).to_string();
        let body = self
            .http
            .get(SEMANTIC_SCHOLAR_URL)
            .query(&[
                ("query", query),
                ("limit", limit.as_str()),
                ("fields", "title,abstract,url,year,authors"),
            ])
            .send()
            .await
            .context("Semantic Scholar request failed")?
            .error_for_status()?
            .text()
            .await?;
        parse_papers(&body, clamp(max_results))
    }

    pub async fn top_news(&self, count: usize) -> Result<Vec<NewsStory>> {
        let ids: Vec<u64> = self
            .http
            .get(format!("{HACKER_NEWS_URL}/topstories.json"))
            .send()
            .await
            .context("Hacker News request failed")?
            .error_for_status()?
            .json()
            .await?;

        let fetches = ids.into_iter().take(clamp(count)).map(|id| async move {
            let story = self
                .http
                .get(format!("{HACKER_NEWS_URL}/item/{id}.json"))
                .send()
                .await?
                .error_for_status()?
                .json::<NewsStory>()
                .await?;
            anyhow::Ok(story)
        });

        let mut stories = Vec::new();
        for result in join_all(fetches).await {
            match result {
                Ok(story) => stories.push(story),
                Err(e) => warn!(error = %e, "Skipping Hacker News item that failed to load"),
            }
        }
        Ok(stories)
    }

    pub async fn stock_quote(&self, symbol: &str) -> Result<StockQuote> {
        let symbol = normalize_symbol(symbol)?;
        debug!(%symbol, "Yahoo Finance lookup");
        let body = self
            .http
            .get(format!("{YAHOO_CHART_URL}/{symbol}"))
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await
            .context("Yahoo Finance request failed")?
            .text()
            .await?;
        parse_stock_quote(&body)
    }
}

/// Upper-cases a ticker and rejects anything that is not a plain symbol such
/// as `AAPL`, `BRK-B`, `^GSPC` or `EURUSD=X`.
pub fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(anyhow!("Ticker symbol must not be empty"));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
    {
        return Err(anyhow!("Invalid ticker symbol '{symbol}'"));
    }
    Ok(symbol)
}

fn clamp(requested: usize) -> usize {
    requested.clamp(1, MAX_RESULTS)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct DuckDuckGoResponse {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    answer: String,
    related_topics: Vec<DuckDuckGoTopic>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct DuckDuckGoTopic {
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
    name: Option<String>,
    topics: Vec<DuckDuckGoTopic>,
}

/// Flattens a DuckDuckGo instant-answer document into search hits.
///
/// The abstract (when present) comes first, then related topics in document
/// order, with grouped topics expanded in place.
pub fn parse_web_search(body: &str, max_results: usize) -> Result<Vec<SearchHit>> {
    let response: DuckDuckGoResponse =
        serde_json::from_str(body).context("Malformed DuckDuckGo response")?;

    let mut hits = Vec::new();
    if !response.abstract_text.is_empty() {
        hits.push(SearchHit {
            title: response.heading.clone(),
            url: response.abstract_url.clone(),
            snippet: response.abstract_text.clone(),
        });
    } else if !response.answer.is_empty() {
        hits.push(SearchHit {
            title: response.heading.clone(),
            url: response.abstract_url.clone(),
            snippet: response.answer.clone(),
        });
    }

    let mut pending: Vec<&DuckDuckGoTopic> = response.related_topics.iter().rev().collect();
    while let Some(topic) = pending.pop() {
        if hits.len() >= max_results {
            break;
        }
        if topic.name.is_some() {
            pending.extend(topic.topics.iter().rev());
            continue;
        }
        if let (Some(text), Some(url)) = (&topic.text, &topic.first_url) {
            let title = text.split(" - ").next().unwrap_or(text).to_string();
            hits.push(SearchHit {
                title,
                url: url.clone(),
                snippet: text.clone(),
            });
        }
    }
    hits.truncate(max_results);
    Ok(hits)
}

#[derive(Deserialize)]
struct PaperSearchResponse {
    #[serde(default)]
    data: Vec<PaperRecord>,
}

#[derive(Deserialize)]
struct PaperRecord {
    title: String,
    #[serde(rename = "abstract")]
    summary: Option<String>,
    url: Option<String>,
    year: Option<u32>,
    #[serde(default)]
    authors: Vec<AuthorRecord>,
}

#[derive(Deserialize)]
struct AuthorRecord {
    name: String,
}

pub fn parse_papers(body: &str, max_results: usize) -> Result<Vec<Paper>> {
    let response: PaperSearchResponse =
        serde_json::from_str(body).context("Malformed Semantic Scholar response")?;
    Ok(response
        .data
        .into_iter()
        .take(max_results)
        .map(|record| Paper {
            title: record.title,
            authors: record.authors.into_iter().map(|a| a.name).collect(),
            year: record.year,
            url: record.url,
            summary: record.summary,
        })
        .collect())
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    currency: Option<String>,
    exchange_name: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Deserialize)]
struct ChartError {
    description: String,
}

pub fn parse_stock_quote(body: &str) -> Result<StockQuote> {
    let response: ChartResponse =
        serde_json::from_str(body).context("Malformed Yahoo Finance response")?;
    if let Some(error) = response.chart.error {
        return Err(anyhow!("Quote lookup failed: {}", error.description));
    }
    let meta = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .map(|result| result.meta)
        .context("Quote lookup returned no data")?;
    let price = meta
        .regular_market_price
        .context("Quote lookup returned no market price")?;
    let change_percent = meta
        .chart_previous_close
        .filter(|close| *close != 0.0)
        .map(|close| ((price - close) / close * 10_000.0).round() / 100.0);

    Ok(StockQuote {
        symbol: meta.symbol,
        currency: meta.currency,
        exchange: meta.exchange_name,
        price,
        previous_close: meta.chart_previous_close,
        change_percent,
    })
}
