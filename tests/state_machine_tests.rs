use chrono::Utc;
use payflow::domain::ports::TransactionRepository;
use payflow::domain::transaction::{NewTransaction, PaymentMethod, PaymentStatus, StatusChange};
use payflow::error::PaymentError;
use rust_decimal_macros::dec;

mod common;

#[tokio::test]
async fn test_refund_on_pending_is_rejected() {
    let engine = common::engine().await;
    let tx = engine
        .orchestrator
        .create_transaction(NewTransaction::new("user-1", dec!(100.00)))
        .await
        .unwrap();

    let err = engine
        .orchestrator
        .refund(tx.id, "too early")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PaymentError::InvalidStateTransition {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Refunded,
        }
    ));

    let stored = engine.orchestrator.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(!stored.metadata.contains_key("refund_reason"));
}

#[tokio::test]
async fn test_complete_requires_begin_processing_first() {
    let engine = common::engine().await;
    let tx = engine
        .orchestrator
        .create_transaction(NewTransaction::new("user-1", dec!(100.00)))
        .await
        .unwrap();

    let change = StatusChange::Complete {
        gateway_reference: "op-1".to_string(),
    };
    assert!(matches!(
        engine.repository.apply(tx.id, change, Utc::now()).await,
        Err(PaymentError::InvalidStateTransition {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Completed,
        })
    ));
}

#[tokio::test]
async fn test_double_complete_is_rejected() {
    let engine = common::engine().await;
    let mut request = NewTransaction::new("user-1", dec!(100.00));
    request.payment_method = PaymentMethod::Wallet;
    let tx = engine.orchestrator.create_transaction(request).await.unwrap();
    engine.orchestrator.process_payment(tx.id).await.unwrap();

    let change = StatusChange::Complete {
        gateway_reference: "op-2".to_string(),
    };
    assert!(matches!(
        engine.repository.apply(tx.id, change, Utc::now()).await,
        Err(PaymentError::InvalidStateTransition {
            from: PaymentStatus::Completed,
            to: PaymentStatus::Completed,
        })
    ));
}

#[tokio::test]
async fn test_cancel_pending_and_processing() {
    let engine = common::engine().await;

    let tx = engine
        .orchestrator
        .create_transaction(NewTransaction::new("user-1", dec!(100.00)))
        .await
        .unwrap();
    let cancelled = engine.orchestrator.cancel(tx.id).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    let tx = engine
        .orchestrator
        .create_transaction(NewTransaction::new("user-1", dec!(100.00)))
        .await
        .unwrap();
    engine.orchestrator.process_payment(tx.id).await.unwrap();
    let cancelled = engine.orchestrator.cancel(tx.id).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    // Cancelled is terminal.
    assert!(engine.orchestrator.cancel(tx.id).await.is_err());
    assert!(engine.orchestrator.process_payment(tx.id).await.is_err());
}

#[tokio::test]
async fn test_full_lifecycle_with_refund() {
    let engine = common::engine().await;
    let config = common::test_config();

    let tx = engine
        .orchestrator
        .create_transaction(NewTransaction::new("user-1", dec!(1000.00)))
        .await
        .unwrap();
    let outcome = engine.orchestrator.process_payment(tx.id).await.unwrap();
    assert_eq!(outcome.transaction.status, PaymentStatus::Processing);

    let raw = common::signed_webhook(&config, &outcome.transaction);
    let response = engine.orchestrator.handle_webhook(&raw).await;
    assert!(response.success);
    assert_eq!(response.status, Some(PaymentStatus::Completed));

    let refunded = engine
        .orchestrator
        .refund(tx.id, "customer request")
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(
        refunded.metadata.get("refund_reason").map(String::as_str),
        Some("customer request")
    );

    // A second refund has no legal edge.
    assert!(engine.orchestrator.refund(tx.id, "again").await.is_err());
}

#[tokio::test]
async fn test_unknown_transaction_is_reported() {
    let engine = common::engine().await;
    let missing = payflow::domain::transaction::TransactionId(404);
    assert!(matches!(
        engine.orchestrator.refund(missing, "nothing there").await,
        Err(PaymentError::UnknownTransaction(_))
    ));
}
