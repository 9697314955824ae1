//! End-to-end pipeline scenarios over in-process fakes. Time is paused so
//! confirmation polling runs instantly.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use busan_donations::chain::{Network, PollStatus};
use busan_donations::payments::{
    DonationError, DonationRequest, LedgerFilter, LedgerStatus, LedgerStore, PaymentInstrument, RefundMode,
    RefundOptions, TransactionHandle,
};
use busan_donations::processor::{CardConfirmer, CardProcessor, CardStatusAdapter};
use busan_donations::wallet::WalletSession;

mod common;
use common::*;

fn eth_request() -> DonationRequest {
    DonationRequest::new(PAYER, dec!(1.0), "ETH", Network::Ethereum).with_recipient(RECIPIENT)
}

fn wallet() -> (Arc<FakeWallet>, PaymentInstrument) {
    let signer = Arc::new(FakeWallet::default());
    let session = Arc::new(WalletSession::new(signer.clone()));
    (signer, PaymentInstrument::Wallet(session))
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_transfer_is_verified_and_recorded() {
    let adapter = ScriptedAdapter::new(
        Network::Ethereum,
        vec![Ok(PollStatus::NotFound), Ok(PollStatus::Pending { confirmations: 0 }), succeeded(dec!(1.0), "ETH", &RECIPIENT.to_lowercase())],
    );
    let store = memory_store();
    let service = service_with(adapter.clone(), store.clone(), 10);
    let (signer, instrument) = wallet();

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(receipt.success);
    assert!(receipt.verified, "{:?}", receipt.error);
    assert!(receipt.error.is_none());
    assert_eq!(adapter.polls(), 3);
    assert_eq!(receipt.explorer_url.as_deref(), Some(format!("https://etherscan.io/tx/{}", TX_HASH).as_str()));

    let sent = signer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount, dec!(1.0));
    assert_eq!(sent[0].to, RECIPIENT);

    let entry = store.get(TX_HASH).await.unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Confirmed);
    assert_eq!(entry.payer, PAYER);
    assert_eq!(entry.network, Network::Ethereum);
}

#[tokio::test(start_paused = true)]
async fn test_recipient_mismatch_is_recorded_pending() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![succeeded(dec!(1.0), "ETH", OTHER_RECIPIENT)]);
    let store = memory_store();
    let service = service_with(adapter, store.clone(), 10);
    let (_, instrument) = wallet();

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(receipt.success);
    assert!(!receipt.verified);
    match receipt.error {
        Some(DonationError::VerificationMismatch { ref reason, .. }) => assert!(reason.contains("recipient mismatch")),
        ref other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(store.get(TX_HASH).await.unwrap().unwrap().status, LedgerStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_handle_and_records_pending() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![Ok(PollStatus::NotFound)]);
    let store = memory_store();
    let service = service_with(adapter.clone(), store.clone(), 3);
    let (_, instrument) = wallet();

    let start = tokio::time::Instant::now();
    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(receipt.success);
    assert_eq!(receipt.handle.as_ref().unwrap().external_reference, TX_HASH);
    assert_eq!(
        receipt.error,
        Some(DonationError::ConfirmationTimedOut {
            reference: TX_HASH.to_string(),
            network: Network::Ethereum,
            attempts: 3,
        })
    );
    assert_eq!(adapter.polls(), 3);
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(store.get(TX_HASH).await.unwrap().unwrap().status, LedgerStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_timeout_updates_same_row() {
    let adapter = ScriptedAdapter::new(
        Network::Ethereum,
        vec![Ok(PollStatus::NotFound), Ok(PollStatus::NotFound), succeeded(dec!(1.0), "ETH", RECIPIENT)],
    );
    let store = memory_store();
    let service = service_with(adapter, store.clone(), 2);
    let (_, instrument) = wallet();
    let request = eth_request();

    let first = service.donate(&request, &instrument).await;
    assert!(matches!(first.error, Some(DonationError::ConfirmationTimedOut { .. })));
    let handle = first.handle.unwrap();

    let second = service.resume(&request, handle, CancellationToken::new()).await;
    assert!(second.verified, "{:?}", second.error);

    let entries = store.list(&LedgerFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, LedgerStatus::Confirmed);
    assert_eq!(entries[0].id, first.ledger_entry.unwrap().id);
}

#[tokio::test(start_paused = true)]
async fn test_transient_rpc_errors_are_retried() {
    let adapter = ScriptedAdapter::new(
        Network::Ethereum,
        vec![
            unavailable(Network::Ethereum),
            unavailable(Network::Ethereum),
            succeeded(dec!(1.0), "ETH", RECIPIENT),
        ],
    );
    let service = service_with(adapter.clone(), memory_store(), 10);
    let (_, instrument) = wallet();

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(receipt.verified);
    assert_eq!(adapter.polls(), 3);
    assert_eq!(receipt.confirmation.unwrap().attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_reverted_transaction_fails_and_records_failed() {
    let adapter = ScriptedAdapter::new(
        Network::Ethereum,
        vec![Ok(PollStatus::Failed { reason: "execution reverted".to_string() })],
    );
    let store = memory_store();
    let service = service_with(adapter, store.clone(), 10);
    let (_, instrument) = wallet();

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(!receipt.success);
    assert!(matches!(receipt.error, Some(DonationError::TransactionFailed { ref reason, .. }) if reason == "execution reverted"));
    assert_eq!(store.get(TX_HASH).await.unwrap().unwrap().status, LedgerStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_ledger_failure_after_payment_is_persistence_failed() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![succeeded(dec!(1.0), "ETH", RECIPIENT)]);
    let service = service_with(adapter, Arc::new(FailingStore), 10);
    let (_, instrument) = wallet();

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(receipt.success);
    assert!(receipt.verified);
    assert!(receipt.ledger_entry.is_none());
    let error = receipt.error.clone().unwrap();
    assert!(matches!(error, DonationError::PersistenceFailed { .. }));
    assert!(receipt.user_message().unwrap().contains(TX_HASH));
}

#[tokio::test(start_paused = true)]
async fn test_reverted_transaction_keeps_failure_when_ledger_is_down() {
    let adapter = ScriptedAdapter::new(
        Network::Ethereum,
        vec![Ok(PollStatus::Failed { reason: "execution reverted".to_string() })],
    );
    let service = service_with(adapter, Arc::new(FailingStore), 10);
    let (_, instrument) = wallet();

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(!receipt.success);
    assert!(receipt.ledger_entry.is_none());
    assert!(matches!(receipt.error, Some(DonationError::TransactionFailed { ref reason, .. }) if reason == "execution reverted"));
    let message = receipt.user_message().unwrap();
    assert!(!message.contains("succeeded"), "{}", message);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_wait_keeps_timeout_when_ledger_is_down() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![Ok(PollStatus::NotFound)]);
    let service = service_with(adapter, Arc::new(FailingStore), 3);
    let (_, instrument) = wallet();

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(receipt.success);
    assert!(matches!(receipt.error, Some(DonationError::ConfirmationTimedOut { attempts: 3, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_before_submission_touches_nothing() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![]);
    let store = memory_store();
    let service = service_with(adapter.clone(), store.clone(), 10);
    let (signer, instrument) = wallet();

    let request = DonationRequest::new(PAYER, dec!(0), "ETH", Network::Ethereum).with_recipient(RECIPIENT);
    let receipt = service.donate(&request, &instrument).await;
    assert!(!receipt.success);
    assert!(matches!(receipt.error, Some(DonationError::Validation(_))));

    let request = DonationRequest::new(PAYER, dec!(1), "ETH", Network::Ethereum).with_recipient("0x1234");
    let receipt = service.donate(&request, &instrument).await;
    assert!(matches!(receipt.error, Some(DonationError::Validation(_))));

    assert!(signer.sent.lock().unwrap().is_empty());
    assert_eq!(adapter.polls(), 0);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_user_rejection_records_nothing() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![]);
    let store = memory_store();
    let service = service_with(adapter.clone(), store.clone(), 10);
    let signer = Arc::new(FakeWallet { reject: true, ..FakeWallet::default() });
    let instrument = PaymentInstrument::Wallet(Arc::new(WalletSession::new(signer)));

    let receipt = service.donate(&eth_request(), &instrument).await;

    assert!(!receipt.success);
    assert_eq!(receipt.error, Some(DonationError::UserRejected));
    assert!(receipt.handle.is_none());
    assert_eq!(adapter.polls(), 0);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disposing_wallet_abandons_wait() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![Ok(PollStatus::NotFound)]);
    let store = memory_store();
    let service = Arc::new(service_with(adapter.clone(), store.clone(), 100));
    let session = Arc::new(WalletSession::new(Arc::new(FakeWallet::default())));
    let instrument = PaymentInstrument::Wallet(session.clone());

    let task = tokio::spawn({
        let service = service.clone();
        async move { service.donate(&eth_request(), &instrument).await }
    });

    tokio::time::sleep(Duration::from_secs(11)).await;
    session.dispose();
    let receipt = task.await.unwrap();

    assert!(receipt.success);
    assert!(matches!(receipt.error, Some(DonationError::ConfirmationAbandoned { .. })));
    assert_eq!(adapter.polls(), 3);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_card_donation_then_refund() {
    let card = Arc::new(FakeCard::default());
    let processor: Arc<dyn CardProcessor> = card.clone();
    let store = memory_store();
    let service = service_with(Arc::new(CardStatusAdapter::new(processor.clone())), store.clone(), 10)
        .with_card_processor(processor);

    let confirmer: Arc<dyn CardConfirmer> = card.clone();
    let request = DonationRequest::new("donor@example.com", dec!(25), "USD", Network::Card);
    let receipt = service.donate(&request, &PaymentInstrument::Card(confirmer)).await;

    assert!(receipt.verified, "{:?}", receipt.error);
    assert!(receipt.explorer_url.is_none());
    let entry = receipt.ledger_entry.unwrap();
    assert_eq!(entry.external_reference, "pi_test_1");
    assert_eq!(entry.status, LedgerStatus::Confirmed);

    let refund = service
        .refund(&entry, RefundOptions { amount: Some(dec!(10)), reason: Some("duplicate".to_string()) })
        .await;
    assert!(refund.success, "{}", refund.message);
    assert_eq!(refund.mode, RefundMode::Reversed);
    assert_eq!(refund.processor_refund_id.as_deref(), Some("re_test_1"));
    assert_eq!(card.refunds.lock().unwrap().as_slice(), &[("pi_test_1".to_string(), Some(1000))]);

    let refunded = store.get("pi_test_1").await.unwrap().unwrap();
    assert_eq!(refunded.status, LedgerStatus::Refunded);

    let again = service.refund(&refunded, RefundOptions::default()).await;
    assert!(!again.success);
    assert!(again.message.contains("already been refunded"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_card_refunds_reverse_once() {
    let card = Arc::new(FakeCard::default());
    let processor: Arc<dyn CardProcessor> = card.clone();
    let store = memory_store();
    let service = service_with(Arc::new(CardStatusAdapter::new(processor.clone())), store.clone(), 10)
        .with_card_processor(processor);

    let confirmer: Arc<dyn CardConfirmer> = card.clone();
    let request = DonationRequest::new("donor@example.com", dec!(25), "USD", Network::Card);
    let entry = service
        .donate(&request, &PaymentInstrument::Card(confirmer))
        .await
        .ledger_entry
        .unwrap();

    let options = || RefundOptions { amount: Some(dec!(10)), reason: None };
    let (a, b) = tokio::join!(service.refund(&entry, options()), service.refund(&entry, options()));

    assert!(a.success != b.success, "a={} b={}", a.message, b.message);
    assert_eq!(card.refunds.lock().unwrap().len(), 1);
    assert_eq!(store.get("pi_test_1").await.unwrap().unwrap().status, LedgerStatus::Refunded);
}

#[tokio::test(start_paused = true)]
async fn test_crypto_refund_is_manual_request() {
    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![succeeded(dec!(1.0), "ETH", RECIPIENT)]);
    let store = memory_store();
    let service = service_with(adapter, store.clone(), 10);
    let (_, instrument) = wallet();

    let entry = service.donate(&eth_request(), &instrument).await.ledger_entry.unwrap();
    let receipt = service
        .refund(&entry, RefundOptions { amount: None, reason: Some("changed my mind".to_string()) })
        .await;

    assert!(receipt.success);
    assert_eq!(receipt.mode, RefundMode::ManualRequest);
    assert!(receipt.message.contains("No funds have been returned"));

    let requests = service.refund_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].external_reference, TX_HASH);
    assert_eq!(requests[0].amount, dec!(1.0));
    assert_eq!(store.get(TX_HASH).await.unwrap().unwrap().status, LedgerStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_background_confirmation_task() {
    let adapter = ScriptedAdapter::new(
        Network::Ethereum,
        vec![Ok(PollStatus::NotFound), succeeded(dec!(1.0), "ETH", RECIPIENT)],
    );
    let service = service_with(adapter, memory_store(), 10);

    let task = service
        .start_confirmation(TransactionHandle::new(TX_HASH, Network::Ethereum), CancellationToken::new())
        .unwrap();
    match task.outcome().await {
        busan_donations::payments::WaitOutcome::Finished(result) => {
            assert_eq!(result.attempts, 2);
            assert_eq!(result.raw_recipient.as_deref(), Some(RECIPIENT));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let missing = service.start_confirmation(TransactionHandle::new("sig", Network::Solana), CancellationToken::new());
    assert!(matches!(missing, Err(DonationError::Config(_))));
}
