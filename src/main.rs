use std::collections::HashMap;

use chrono::{Duration, Utc};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::application::orchestrator::PaymentOrchestrator;
use payflow::domain::money;
use payflow::domain::offer::{Offer, OfferType};
use payflow::domain::ports::OfferCatalog;
use payflow::domain::transaction::{NewTransaction, PaymentMethod, Transaction};
use payflow::infrastructure::in_memory::{InMemoryOfferCatalog, InMemoryTransactionRepository};
use payflow::interfaces::robokassa::gateway::{RobokassaClient, RobokassaConfig};
use payflow::interfaces::robokassa::signature::SignaturePayload;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Amount to charge, in major units (e.g. 1000.00)
    amount: Decimal,

    /// User the transaction belongs to
    #[arg(long, default_value = "demo-user")]
    user: String,

    /// Payment method: sbp, card, wallet or bank_transfer
    #[arg(long, default_value = "sbp")]
    method: PaymentMethod,

    /// Offer ids to apply, in order (defaults to every valid offer)
    #[arg(long = "offer")]
    offers: Vec<String>,

    /// Feed a correctly signed confirmation webhook back through the engine
    #[arg(long)]
    simulate_webhook: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = RobokassaConfig::from_env().unwrap_or_else(|_| {
        let mut demo = RobokassaConfig::new("demo-shop", "password-one", "password-two");
        demo.test_mode = true;
        demo
    });

    let catalog = InMemoryOfferCatalog::new();
    seed_offers(&catalog).await.into_diagnostic()?;

    let orchestrator = PaymentOrchestrator::new(
        Box::new(catalog),
        Box::new(InMemoryTransactionRepository::new()),
        Box::new(RobokassaClient::new(config.clone())),
    );

    let mut request = NewTransaction::new(cli.user, cli.amount);
    request.payment_method = cli.method;
    request.description = Some("Demo order".to_string());
    if !cli.offers.is_empty() {
        request.offer_ids = Some(cli.offers);
    }

    let tx = orchestrator
        .create_transaction(request)
        .await
        .into_diagnostic()?;
    let outcome = orchestrator.process_payment(tx.id).await.into_diagnostic()?;
    if let Some(url) = &outcome.payment_url {
        println!("payment url: {url}");
    }

    if cli.simulate_webhook {
        let raw = signed_confirmation(&config, &outcome.transaction);
        let response = orchestrator.handle_webhook(&raw).await;
        println!(
            "webhook response: {}",
            serde_json::to_string_pretty(&response).into_diagnostic()?
        );
    }

    let summary = orchestrator.payment_summary(tx.id).await.into_diagnostic()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).into_diagnostic()?
    );
    Ok(())
}

/// The stock offers the shop runs by default.
async fn seed_offers(catalog: &InMemoryOfferCatalog) -> payflow::error::Result<()> {
    let now = Utc::now();

    let mut welcome = Offer::new("WELCOME10", OfferType::Discount, "Welcome Discount");
    welcome.description = "10% discount on first purchase".to_string();
    welcome.discount_percentage = Some(dec!(10));
    welcome.max_discount = Some(dec!(50.00));
    welcome.min_amount = dec!(10.00);
    welcome.valid_from = Some(now);
    welcome.valid_until = Some(now + Duration::days(30));
    welcome.code = Some("WELCOME10".to_string());
    catalog.register(welcome).await?;

    let mut cashback = Offer::new("CASHBACK5", OfferType::Cashback, "Cashback Offer");
    cashback.description = "Get 5.00 back on larger orders".to_string();
    cashback.cashback_amount = Some(dec!(5.00));
    cashback.min_amount = dec!(50.00);
    cashback.valid_from = Some(now);
    cashback.valid_until = Some(now + Duration::days(90));
    cashback.code = Some("CASHBACK5".to_string());
    catalog.register(cashback).await?;

    let mut shipping = Offer::new("FREESHIP", OfferType::FreeShipping, "Free Shipping");
    shipping.description = "Free shipping on orders over 500".to_string();
    shipping.min_amount = dec!(500.00);
    shipping.valid_from = Some(now);
    shipping.valid_until = Some(now + Duration::days(60));
    catalog.register(shipping).await?;

    Ok(())
}

/// A confirmation webhook exactly as the gateway would send it.
fn signed_confirmation(config: &RobokassaConfig, tx: &Transaction) -> HashMap<String, String> {
    let signature = SignaturePayload {
        merchant_login: &config.merchant_login,
        amount: tx.final_amount,
        order_id: tx.id.invoice_id(),
        extra: &[],
    }
    .sign(config.algorithm, &config.inbound_secret);

    HashMap::from([
        ("InvId".to_string(), tx.id.invoice_id().to_string()),
        ("Sum".to_string(), money::format_wire(tx.final_amount)),
        ("SignatureValue".to_string(), signature),
        ("MerchantLogin".to_string(), config.merchant_login.clone()),
        ("OperationId".to_string(), "op-demo-1".to_string()),
        (
            "IsTest".to_string(),
            if config.test_mode { "1" } else { "0" }.to_string(),
        ),
    ])
}
