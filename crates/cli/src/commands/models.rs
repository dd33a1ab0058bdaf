//! `lily models`: List models offered by the cloud endpoint.

use lily_providers::{CloudClient, CloudModel};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let client = CloudClient::from_config(&config.cloud)?;

    eprint!("  Fetching models from {}...", client.base_url());
    let mut models = client.list_models().await?;
    eprint!("\r{}\r", " ".repeat(80));
    models.sort_by(|a, b| a.id.cmp(&b.id));

    println!("🤖 Models ({})", models.len());
    println!("─────────────────────────────────────────────────────────────────────");
    println!(
        "{:<44} {:>9} {:>7}  {}",
        "Model", "Context", "Vision", "Price in/out (per 1M)"
    );
    for model in &models {
        let marker = if model.id == config.default_model { "*" } else { " " };
        println!("{marker}{}", model_row(model));
    }
    Ok(())
}

fn model_row(model: &CloudModel) -> String {
    let vision = if model.capabilities().supports_vision {
        "yes"
    } else {
        "-"
    };
    format!(
        "{:<43} {:>9} {:>7}  {}",
        super::truncate(&model.id, 43),
        model.context_length,
        vision,
        price_per_million(&model.pricing.prompt, &model.pricing.completion),
    )
}

/// Endpoint prices are per token as decimal strings.
fn price_per_million(prompt: &str, completion: &str) -> String {
    let per_m = |p: &str| p.parse::<f64>().ok().map(|v| v * 1_000_000.0);
    match (per_m(prompt), per_m(completion)) {
        (Some(i), Some(o)) if i == 0.0 && o == 0.0 => "free".to_string(),
        (Some(i), Some(o)) => format!("${i:.2} / ${o:.2}"),
        _ => "-".to_string(),
    }
}
