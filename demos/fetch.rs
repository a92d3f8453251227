//! Example: fetch a company's submissions and download its latest filing.
//!
//! Run with: EDGAR_USER_AGENT="name email@example.com" cargo run --example fetch -- 320193

use std::time::Duration;

use edgar_http::{AccessError, HttpAccessClient, RequestOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edgar_http=debug".into()),
        )
        .init();

    let user_agent = match std::env::var("EDGAR_USER_AGENT") {
        Ok(ua) => ua,
        Err(_) => {
            println!("Set EDGAR_USER_AGENT (\"name email\") to run this example.");
            return Ok(());
        }
    };
    let cik: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(320193);

    let client = HttpAccessClient::builder()
        .user_agent(user_agent)
        .max_requests_per_second(5.0)
        .timeout(Duration::from_secs(20))
        .build()?;

    let url = format!("https://data.sec.gov/submissions/CIK{cik:010}.json");
    let submissions: serde_json::Value = client.get(&url).await?.json()?;
    println!("Company: {}", submissions["name"]);

    // Second call is served from the cache.
    let again = client.get(&url).await?;
    println!("Cached: {}", again.is_cached());

    let recent = &submissions["filings"]["recent"];
    let Some(accession) = recent["accessionNumber"][0].as_str() else {
        println!("No recent filings");
        return Ok(());
    };
    println!("Latest filing: {} ({})", accession, recent["form"][0]);

    let filing_url = format!(
        "https://www.sec.gov/Archives/edgar/data/{cik}/{}/{accession}.txt",
        accession.replace('-', "")
    );
    let dest = std::env::temp_dir().join("edgar").join(format!("{accession}.txt"));
    match client.download(&filing_url, &dest).await {
        Ok(outcome) => println!(
            "Saved {} bytes to {}",
            outcome.bytes_written,
            outcome.path.display()
        ),
        Err(AccessError::Permanent { cause, .. }) => println!("Not available: {cause}"),
        Err(e) => return Err(e.into()),
    }

    // Query parameters are sorted into the cache key, so order does not matter.
    let options = RequestOptions::new()
        .param("action", "getcompany")
        .param("CIK", cik.to_string())
        .param("type", "10-K")
        .header("Accept", "application/atom+xml");
    let feed = client
        .get_with("https://www.sec.gov/cgi-bin/browse-edgar", &options)
        .await?;
    println!("10-K feed: {} bytes", feed.body().len());

    Ok(())
}
