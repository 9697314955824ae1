use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use busan_donations::config::{load_config, ADMIN_API_KEY_ENV};
use busan_donations::currency::{Converter, Currency, PaymentMethod, PaymentValidator};

#[derive(Parser)]
#[command(name = "donation-cli")]
#[command(about = "Operator CLI for the Global BUSAN donation service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = ADMIN_API_KEY_ENV, hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Service status and enabled networks
    Status,
    /// List ledger entries, newest first
    Ledger {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        payer: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one ledger entry
    Entry { reference: String },
    /// Check whether a donation can be refunded
    Eligibility { reference: String },
    /// Refund a donation (partial when --amount is given)
    Refund {
        reference: String,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List manual refund requests
    RefundRequests,
    /// Print the explorer link for a transaction
    Explorer { network: String, reference: String },
    /// Validate a config file without starting the service
    CheckConfig { path: PathBuf },
    /// Convert an amount between currencies using built-in rates
    Convert { amount: Decimal, from: String, to: String },
    /// Check an amount against the minimum for a payment method
    CheckAmount {
        amount: Decimal,
        currency: String,
        /// card or crypto_processor
        #[arg(long, default_value = "card")]
        method: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    let request = match cli.command {
        Commands::CheckConfig { path } => return check_config(&path),
        Commands::Convert { amount, from, to } => {
            let (from, to) = (Currency::from(from.as_str()), Currency::from(to.as_str()));
            let conversion = Converter::default().convert_checked(amount, &from, &to);
            match conversion.warning {
                Some(warning) => eprintln!("Warning: {}", warning),
                None => println!("{} {} = {} {}", amount, from, conversion.amount.round_dp(8).normalize(), to),
            }
            return Ok(());
        }
        Commands::CheckAmount { amount, currency, method } => {
            let method = match method.as_str() {
                "card" => PaymentMethod::Card,
                "crypto_processor" => PaymentMethod::CryptoProcessor,
                other => return Err(format!("unknown payment method '{}'", other).into()),
            };
            let result = PaymentValidator::default().validate_amount(amount, &Currency::from(currency.as_str()), method);
            match result.error {
                Some(error) => println!("Invalid: {}", error),
                None => println!("OK"),
            }
            return Ok(());
        }
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Ledger { status, payer, limit } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(status) = status {
                query.push(("status", status));
            }
            if let Some(payer) = payer {
                query.push(("payer", payer));
            }
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            client.get(format!("{}/admin/ledger", base)).query(&query)
        }
        Commands::Entry { reference } => client.get(format!("{}/admin/ledger/{}", base, reference)),
        Commands::Eligibility { reference } => {
            client.get(format!("{}/admin/ledger/{}/refund-eligibility", base, reference))
        }
        Commands::Refund { reference, amount, reason } => client
            .post(format!("{}/admin/ledger/{}/refund", base, reference))
            .json(&json!({ "amount": amount, "reason": reason })),
        Commands::RefundRequests => client.get(format!("{}/admin/refund-requests", base)),
        Commands::Explorer { network, reference } => client
            .get(format!("{}/admin/explorer", base))
            .query(&[("network", network), ("reference", reference)]),
    };

    let key = cli
        .key
        .ok_or_else(|| format!("admin key required (--key or {})", ADMIN_API_KEY_ENV))?;
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", key))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match load_config(path) {
        Ok(config) => {
            println!(
                "OK: {} EVM network(s), solana {}, ledger {:?}",
                config.evm.len(),
                if config.solana.enabled { "on" } else { "off" },
                config.ledger.backend
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            std::process::exit(1);
        }
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
