mod common;

use common::{eventually, harness, harness_with_timer, request};
use rust_decimal_macros::dec;
use std::time::Duration;
use tracktrove::application::escrow::ExpirySignalHandler;
use tracktrove::domain::ledger::LedgerType;
use tracktrove::domain::status::TransactionStatus;
use tracktrove::domain::trace::step;
use tracktrove::error::LifecycleError;

#[tokio::test]
async fn test_expiry_signal_escrows_transaction() {
    let (h, signals) = harness_with_timer(true);
    let listener = tokio::spawn(ExpirySignalHandler::new(signals).run(h.service.coordinator().clone()));

    let tx = h.service.initiate(request(dec!(250.00), 1.0)).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Initiated);

    let service = h.service.clone();
    let id = tx.id;
    let escrowed = eventually(Duration::from_secs(2), move || {
        let service = service.clone();
        async move { service.get(id).await.unwrap().status == TransactionStatus::Escrow }
    })
    .await;
    assert!(escrowed, "expiry signal never escrowed the transaction");

    let entries = h.service.ledger_for(tx.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, LedgerType::Escrow);
    assert_eq!(entries[0].amount, dec!(250.00));

    assert_eq!(h.steps(tx.id).await, vec![step::AUTO_ESCROW, step::INITIATED]);
    listener.abort();
}

#[tokio::test]
async fn test_retry_limit_reached_marks_permanently_failed() {
    let h = harness(false);
    let tx = h.service.initiate(request(dec!(80), 0.0)).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);

    let mut exhausted = tx.clone();
    exhausted.retry_count = 3;
    h.force(exhausted).await;

    let report = h.service.retry_engine().run_once().await.unwrap();
    assert_eq!(report.permanently_failed, 1);

    let stored = h.service.get(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::PermanentlyFailed);
    assert_eq!(stored.retry_count, 3);
    assert!(h.service.ledger_for(tx.id).await.unwrap().is_empty());

    let steps = h.steps(tx.id).await;
    assert_eq!(steps[0], step::RETRY_LIMIT_EXCEEDED);
    assert_eq!(
        steps.iter().filter(|s| *s == step::RETRY_LIMIT_EXCEEDED).count(),
        1
    );
    assert_eq!(
        h.service.last_error(tx.id).await.unwrap().as_deref(),
        Some("Transaction reached max retry limit (3).")
    );

    // Terminal: a second run leaves it alone.
    let report = h.service.retry_engine().run_once().await.unwrap();
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn test_open_dispute_on_escrow_is_invalid() {
    let h = harness(true);
    let tx = h.service.initiate(request(dec!(15), 1.0)).await.unwrap();
    h.service
        .coordinator()
        .drain(&h.service.escrow_sweep())
        .await
        .unwrap();

    let result = h.service.open_dispute(tx.id).await;
    assert!(matches!(
        result,
        Err(LifecycleError::InvalidState {
            status: TransactionStatus::Escrow,
            ..
        })
    ));
    assert_eq!(
        h.service.get(tx.id).await.unwrap().status,
        TransactionStatus::Escrow
    );
}

#[tokio::test]
async fn test_settlement_failure_is_isolated_per_item() {
    let h = harness(true);
    let mut ids = Vec::new();
    for i in 1..=5 {
        let tx = h
            .service
            .initiate(request(rust_decimal::Decimal::from(i * 10), 1.0))
            .await
            .unwrap();
        ids.push(tx.id);
    }
    let escrow = h
        .service
        .coordinator()
        .drain(&h.service.escrow_sweep())
        .await
        .unwrap();
    assert_eq!(escrow.escrowed, 5);

    h.ledger.fail_for(ids[2]);
    let report = h.service.settlement_sweep().run_once().await.unwrap();
    assert_eq!(report.settled, 4);
    assert_eq!(report.failed, 1);

    for (i, id) in ids.iter().enumerate() {
        let stored = h.service.get(*id).await.unwrap();
        if i == 2 {
            assert_eq!(stored.status, TransactionStatus::Escrow);
        } else {
            assert_eq!(stored.status, TransactionStatus::Settled);
            assert_eq!(h.service.ledger_for(*id).await.unwrap().len(), 2);
        }
    }

    let failed = ids[2];
    assert_eq!(h.service.ledger_for(failed).await.unwrap().len(), 1);
    assert_eq!(h.steps(failed).await[0], step::SETTLEMENT_EXCEPTION);
    let error = h.service.last_error(failed).await.unwrap().unwrap();
    assert!(error.contains("ledger unavailable"), "unexpected error: {error}");
}

#[tokio::test]
async fn test_round_moves_transaction_to_settled() {
    let h = harness(true);
    let tx = h.service.initiate(request(dec!(42.50), 1.0)).await.unwrap();

    let round = h.service.run_round().await.unwrap();
    assert_eq!(round.escrow_sweep.escrowed, 1);
    assert_eq!(round.settlement.settled, 1);

    let stored = h.service.get(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Settled);

    let kinds: Vec<LedgerType> = h
        .service
        .ledger_for(tx.id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![LedgerType::Escrow, LedgerType::Settlement]);
    assert_eq!(
        h.steps(tx.id).await,
        vec![step::AUTO_SETTLEMENT, step::SCHEDULED_ESCROW, step::INITIATED]
    );

    let round = h.service.run_round().await.unwrap();
    assert_eq!(round, Default::default());
}

#[tokio::test]
async fn test_simulated_initiation_failure() {
    let h = harness(false);
    let tx = h.service.initiate(request(dec!(9.99), 0.0)).await.unwrap();

    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.retry_count, 0);
    assert_eq!(
        h.steps(tx.id).await,
        vec![step::INITIATION_FAILED, step::INITIATED]
    );
    assert_eq!(
        h.service.last_error(tx.id).await.unwrap().as_deref(),
        Some("Simulated initiation failure.")
    );
}

#[tokio::test]
async fn test_invalid_request_is_not_persisted() {
    let h = harness(true);
    let result = h.service.initiate(request(dec!(0), 1.0)).await;

    assert!(matches!(result, Err(LifecycleError::ValidationError(_))));
    assert!(h.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_failure_restores_status() {
    let h = harness(true);
    let tx = h.service.initiate(request(dec!(12), 1.0)).await.unwrap();
    h.ledger.fail_for(tx.id);

    let result = h
        .service
        .coordinator()
        .escrow(tx.id, step::AUTO_ESCROW, "hold")
        .await;
    assert!(matches!(
        result,
        Err(LifecycleError::LedgerRolledBack {
            restored: TransactionStatus::Initiated,
            ..
        })
    ));

    assert_eq!(
        h.service.get(tx.id).await.unwrap().status,
        TransactionStatus::Initiated
    );
    assert!(h.service.ledger_for(tx.id).await.unwrap().is_empty());
    assert_eq!(h.steps(tx.id).await, vec![step::INITIATED]);
}

#[tokio::test]
async fn test_trace_failure_keeps_committed_status() {
    let h = harness(true);
    let tx = h.service.initiate(request(dec!(12), 1.0)).await.unwrap();
    h.traces.fail_for(tx.id);

    let result = h
        .service
        .coordinator()
        .escrow(tx.id, step::AUTO_ESCROW, "hold")
        .await;
    assert!(matches!(
        result,
        Err(LifecycleError::SideEffectFailure {
            committed: TransactionStatus::Escrow,
            ..
        })
    ));

    assert_eq!(
        h.service.get(tx.id).await.unwrap().status,
        TransactionStatus::Escrow
    );
    assert_eq!(h.service.ledger_for(tx.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_initiation_is_broadcast() {
    let h = harness(true);
    let (_, mut messages) = h.notifier.subscribe();

    let tx = h.service.initiate(request(dec!(5), 1.0)).await.unwrap();

    let message = messages.recv().await.unwrap();
    assert!(message.contains(&tx.id.short()));
    assert!(message.contains("initiated"));
}

#[tokio::test]
async fn test_escrow_error_is_isolated_per_item() {
    let h = harness(true);
    let broken = h.service.initiate(request(dec!(8), 1.0)).await.unwrap();
    let healthy = h.service.initiate(request(dec!(9), 1.0)).await.unwrap();
    h.ledger.fail_for(broken.id);

    let report = h
        .service
        .coordinator()
        .drain(&h.service.escrow_sweep())
        .await
        .unwrap();
    assert_eq!(report.escrowed, 1);
    assert_eq!(report.failed, 1);

    assert_eq!(
        h.service.get(healthy.id).await.unwrap().status,
        TransactionStatus::Escrow
    );
    assert_eq!(
        h.service.get(broken.id).await.unwrap().status,
        TransactionStatus::Initiated
    );
    assert_eq!(
        h.steps(broken.id).await,
        vec![step::ESCROW_EXCEPTION, step::INITIATED]
    );
}
