//! Basic usage of the SWR memoizer.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swr_memo::{create_swr, error::Result, Error, Fetcher, SwrBuilder};

/// Example value: an exchange rate quote
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Quote {
    pair: String,
    rate: f64,
    revision: u32,
}

/// Mock pricing API. Each call produces a new revision.
#[derive(Clone, Default)]
struct PricingApi {
    requests: Arc<AtomicU32>,
}

impl Fetcher<String, Quote> for PricingApi {
    async fn fetch(&self, pair: String) -> Result<Quote> {
        let revision = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  [API] Fetching quote for {} (request #{})", pair, revision);

        tokio::time::sleep(Duration::from_millis(150)).await;

        match pair.as_str() {
            "EUR/USD" => Ok(Quote {
                pair,
                rate: 1.08 + f64::from(revision) / 1000.0,
                revision,
            }),
            "GBP/USD" => Ok(Quote {
                pair,
                rate: 1.27 + f64::from(revision) / 1000.0,
                revision,
            }),
            _ => Err(Error::fetch(format!("unknown pair {}", pair))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== swr-memo - Basic Example ===\n");

    // 1. Wrap the fetch function
    println!("1. Memoizing the pricing API with a 1s refresh interval...");
    let api = PricingApi::default();
    let get_quote = create_swr(api.clone(), Duration::from_secs(1))?;
    println!("   ✓ Memoizer ready\n");

    // 2. First request - cold, waits for the API
    println!("2. First request for EUR/USD:");
    let quote = get_quote.call_detailed("EUR/USD".to_string()).await?;
    println!(
        "   ✓ {} = {:.4} (rev {}, {})\n",
        quote.value.pair, quote.value.rate, quote.value.revision, quote.outcome
    );

    // 3. Second request - served from the cache
    println!("3. Second request for EUR/USD:");
    let quote = get_quote.call_detailed("EUR/USD".to_string()).await?;
    println!(
        "   ✓ {} = {:.4} (rev {}, {})\n",
        quote.value.pair, quote.value.rate, quote.value.revision, quote.outcome
    );

    // 4. After the TTL the background refresh has already replaced the value
    println!("4. Waiting 1.3s for the background refresh...");
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let quote = get_quote.call_detailed("EUR/USD".to_string()).await?;
    println!(
        "   ✓ {} = {:.4} (rev {}, {})\n",
        quote.value.pair, quote.value.rate, quote.value.revision, quote.outcome
    );

    // 5. Errors on a cold call reach the caller
    println!("5. Unknown pair:");
    match get_quote.call("XXX/YYY".to_string()).await {
        Ok(_) => println!("   ✗ Unexpected success\n"),
        Err(e) => println!("   ✓ Error surfaced to caller: {}\n", e),
    }

    // 6. Builder: namespace, custom key, concurrent cold callers share one fetch
    println!("6. Builder with single-flight:");
    let shared = SwrBuilder::new(api.clone())
        .ttl(Duration::from_secs(1))
        .namespace("fx")
        .single_flight(true)
        .key_deriver(|pair: &String| pair.replace('/', "_"))
        .build()?;

    let before = api.requests.load(Ordering::SeqCst);
    let (a, b) = tokio::join!(
        shared.call("GBP/USD".to_string()),
        shared.call("GBP/USD".to_string())
    );
    println!(
        "   ✓ Two callers got revs {} and {} with {} API request(s)\n",
        a?.revision,
        b?.revision,
        api.requests.load(Ordering::SeqCst) - before
    );

    // 7. Teardown
    println!("7. Shutting down:");
    let cancelled = get_quote.shutdown() + shared.shutdown();
    println!("   ✓ {} refresh timers cancelled", cancelled);

    println!("\n=== Example Complete ===\n");

    Ok(())
}
