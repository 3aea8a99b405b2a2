use std::collections::HashMap;

use payflow::application::orchestrator::{OrchestratorConfig, PaymentOrchestrator};
use payflow::domain::money;
use payflow::domain::offer::{Offer, OfferType};
use payflow::domain::ports::OfferCatalog;
use payflow::domain::transaction::Transaction;
use payflow::infrastructure::in_memory::{InMemoryOfferCatalog, InMemoryTransactionRepository};
use payflow::interfaces::robokassa::gateway::{RobokassaClient, RobokassaConfig};
use payflow::interfaces::robokassa::signature::SignaturePayload;
use rust_decimal_macros::dec;

pub fn test_config() -> RobokassaConfig {
    let mut config = RobokassaConfig::new("demo-shop", "password-one", "password-two");
    config.test_mode = true;
    config
}

pub fn welcome_offer() -> Offer {
    let mut offer = Offer::new("WELCOME10", OfferType::Discount, "Welcome Discount");
    offer.discount_percentage = Some(dec!(10));
    offer.max_discount = Some(dec!(50.00));
    offer.min_amount = dec!(10.00);
    offer
}

/// Engine wired against in-memory adapters, with handles to the shared
/// stores so tests can observe or pre-shape state.
pub struct TestEngine {
    pub orchestrator: PaymentOrchestrator,
    pub catalog: InMemoryOfferCatalog,
    pub repository: InMemoryTransactionRepository,
}

pub async fn engine() -> TestEngine {
    engine_with_config(OrchestratorConfig::default()).await
}

pub async fn engine_with_config(config: OrchestratorConfig) -> TestEngine {
    let catalog = InMemoryOfferCatalog::new();
    catalog.register(welcome_offer()).await.unwrap();
    let repository = InMemoryTransactionRepository::new();
    let orchestrator = PaymentOrchestrator::with_config(
        Box::new(catalog.clone()),
        Box::new(repository.clone()),
        Box::new(RobokassaClient::new(test_config())),
        config,
    );
    TestEngine {
        orchestrator,
        catalog,
        repository,
    }
}

/// A confirmation webhook signed with the inbound secret, exactly as the
/// gateway would post it.
pub fn signed_webhook(config: &RobokassaConfig, tx: &Transaction) -> HashMap<String, String> {
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
        ("OperationId".to_string(), "op-001".to_string()),
        ("IsTest".to_string(), "1".to_string()),
    ])
}
