use std::time::Duration;

use fluent_http::RequestBuilder;

fn main() -> anyhow::Result<()> {
    let url = std::env::var("FLUENT_HTTP_URL")?;

    let response = RequestBuilder::new()
        .post(&url)
        .header("x-client", "fluent-http-demo")
        .json(&serde_json::json!({ "name": "Kit" }))
        .timeout(Duration::from_secs(5))
        .initial_interval(Duration::from_millis(200))
        .max_elapsed_time(Duration::from_secs(30))
        .retry(3)
        .send()?;

    println!("{} {}", response.status(), response.text());

    Ok(())
}
