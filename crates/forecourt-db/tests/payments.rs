//! Payment capture and refunds.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use common::{harness, harness_on, ledger_rows, payment_rows, service_invoice};
use forecourt_core::payment::CashStrategy;
use forecourt_core::validation::ValidationResult;
use forecourt_core::{
    EntrySide, FuelPriceTable, InvoiceStatus, Money, PaymentAttempt, PaymentMethod,
    PaymentStrategy, ProcessingOutcome, StrategyRegistry,
};
use forecourt_db::{BillingConfig, BillingService, Database, ErrorCode, PaymentRequest, RefundRequest};

fn cash(invoice_id: &str, major: i64) -> PaymentRequest {
    PaymentRequest::new(invoice_id, Money::from_major(major), PaymentMethod::Cash)
}

#[tokio::test]
async fn partial_then_excess_payment() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;

    let payment = h
        .billing
        .record_payment(cash(&invoice.id, 65).actor("cashier-1"))
        .await
        .unwrap();
    assert_eq!(payment.amount(), Money::from_major(65));
    assert!(payment.reference.as_deref().unwrap().starts_with("CASH-"));

    let after = h.billing.find_invoice(&invoice.id).await.unwrap();
    assert_eq!(after.paid(), Money::from_major(65));
    assert_eq!(after.balance(), Money::from_major(50));
    assert_eq!(after.status, InvoiceStatus::Partial);

    let entries = h
        .finance
        .entries_for_reference(payment.reference.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    let debit = entries.iter().find(|e| e.side == EntrySide::Debit).unwrap();
    let credit = entries.iter().find(|e| e.side == EntrySide::Credit).unwrap();
    assert_eq!(debit.account, "CASH");
    assert_eq!(credit.account, "ACCOUNTS_RECEIVABLE");
    assert_eq!(debit.amount_cents, 6_500);
    assert_eq!(credit.amount_cents, 6_500);
    assert_eq!(debit.created_by.as_deref(), Some("cashier-1"));

    let err = h.billing.record_payment(cash(&invoice.id, 75)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AmountExceedsBalance);

    let unchanged = h.billing.find_invoice(&invoice.id).await.unwrap();
    assert_eq!(unchanged.paid(), Money::from_major(65));
    assert_eq!(payment_rows(&h.db).await, 1);
    assert_eq!(ledger_rows(&h.db).await, 4);
}

#[tokio::test]
async fn half_cash_then_half_card() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    let half = Money::from_cents(5_750);

    let first = h
        .billing
        .record_payment(PaymentRequest::new(&invoice.id, half, PaymentMethod::Cash).reference("X"))
        .await
        .unwrap();
    let after = h.billing.find_invoice(&invoice.id).await.unwrap();
    assert_eq!(after.status, InvoiceStatus::Partial);
    assert_eq!(after.balance(), half);

    let second = h
        .billing
        .record_payment(PaymentRequest::new(&invoice.id, half, PaymentMethod::Card).reference("ABCDEFGHIJ"))
        .await
        .unwrap();
    let after = h.billing.find_invoice(&invoice.id).await.unwrap();
    assert_eq!(after.status, InvoiceStatus::Paid);
    assert!(after.balance().is_zero());

    for (payment, account) in [(&first, "CASH"), (&second, "CARD_PAYMENTS")] {
        let entries = h
            .finance
            .entries_for_reference(payment.reference.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].side, EntrySide::Debit);
        assert_eq!(entries[0].account, account);
        assert_eq!(entries[1].account, "ACCOUNTS_RECEIVABLE");
        assert!(entries.iter().all(|e| e.amount() == half));
    }
}

#[tokio::test]
async fn exact_balance_settles_invoice() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;

    h.billing.record_payment(cash(&invoice.id, 65)).await.unwrap();
    h.billing.record_payment(cash(&invoice.id, 50)).await.unwrap();

    let after = h.billing.find_invoice(&invoice.id).await.unwrap();
    assert_eq!(after.status, InvoiceStatus::Paid);
    assert!(after.balance().is_zero());

    let err = h
        .billing
        .record_payment(PaymentRequest::new(&invoice.id, Money::from_cents(1), PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AmountExceedsBalance);
}

#[tokio::test]
async fn card_and_online_payments_post_to_their_accounts() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;

    let card = h
        .billing
        .record_payment(
            PaymentRequest::new(&invoice.id, Money::from_major(40), PaymentMethod::Card)
                .reference("TERM123456"),
        )
        .await
        .unwrap();
    assert!(card.reference.as_deref().unwrap().starts_with("CARD-"));

    let online = h
        .billing
        .record_payment(
            PaymentRequest::new(&invoice.id, Money::from_major(75), PaymentMethod::Online)
                .reference("GW-2024-0001"),
        )
        .await
        .unwrap();
    assert!(online.reference.as_deref().unwrap().starts_with("ONLINE-"));

    assert_eq!(h.finance.account_balance("CARD_PAYMENTS").await.unwrap(), Money::from_major(-40));
    assert_eq!(h.finance.account_balance("ONLINE_PAYMENTS").await.unwrap(), Money::from_major(-75));
    assert_eq!(
        h.billing.find_invoice(&invoice.id).await.unwrap().status,
        InvoiceStatus::Paid
    );
}

#[tokio::test]
async fn strategy_rejections_write_nothing() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;

    let no_reference = h
        .billing
        .record_payment(PaymentRequest::new(&invoice.id, Money::from_major(40), PaymentMethod::Card))
        .await
        .unwrap_err();
    assert_eq!(no_reference.code(), ErrorCode::ValidationFailed);

    let short = h
        .billing
        .record_payment(
            PaymentRequest::new(&invoice.id, Money::from_major(40), PaymentMethod::Card).reference("short"),
        )
        .await
        .unwrap_err();
    assert_eq!(short.code(), ErrorCode::ValidationFailed);
    assert!(short.to_string().contains("reference"));

    let below_minimum = h
        .billing
        .record_payment(
            PaymentRequest::new(&invoice.id, Money::from_major(5), PaymentMethod::Online)
                .reference("abcdefgh"),
        )
        .await
        .unwrap_err();
    assert_eq!(below_minimum.code(), ErrorCode::ValidationFailed);

    assert_eq!(payment_rows(&h.db).await, 0);
    assert_eq!(ledger_rows(&h.db).await, 2);
    assert_eq!(
        h.billing.find_invoice(&invoice.id).await.unwrap().status,
        InvoiceStatus::Unpaid
    );
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;

    let zero = h
        .billing
        .record_payment(PaymentRequest::new(&invoice.id, Money::zero(), PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert_eq!(zero.code(), ErrorCode::AmountNonPositive);

    let negative = h
        .billing
        .record_payment(PaymentRequest::new(&invoice.id, Money::from_major(-5), PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert_eq!(negative.code(), ErrorCode::AmountNonPositive);

    let refund = h
        .billing
        .process_refund(RefundRequest::new(&invoice.id, Money::zero(), "nothing"))
        .await
        .unwrap_err();
    assert_eq!(refund.code(), ErrorCode::AmountNonPositive);
}

#[tokio::test]
async fn missing_invoice_is_reported_first() {
    let h = harness().await;

    let err = h.billing.record_payment(cash("missing", 0)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvoiceNotFound);

    let err = h
        .billing
        .process_refund(RefundRequest::new("missing", Money::from_major(10), "damaged"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvoiceNotFound);
}

#[tokio::test]
async fn refund_reduces_paid() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    h.billing.record_payment(cash(&invoice.id, 100)).await.unwrap();

    let refund = h
        .billing
        .process_refund(RefundRequest::new(&invoice.id, Money::from_major(40), "damaged part").actor("manager"))
        .await
        .unwrap();

    assert_eq!(refund.amount(), Money::from_major(-40));
    assert!(refund.is_refund());
    assert_eq!(refund.method, PaymentMethod::Cash);
    assert!(refund.reference.as_deref().unwrap().starts_with("REFUND-"));
    assert_eq!(refund.notes.as_deref(), Some("Refund: damaged part"));

    let after = h.billing.find_invoice(&invoice.id).await.unwrap();
    assert_eq!(after.paid(), Money::from_major(60));
    assert_eq!(after.balance(), Money::from_major(55));
    assert_eq!(after.status, InvoiceStatus::Partial);

    let entries = h
        .finance
        .entries_for_reference(refund.reference.as_deref().unwrap())
        .await
        .unwrap();
    let debit = entries.iter().find(|e| e.side == EntrySide::Debit).unwrap();
    let credit = entries.iter().find(|e| e.side == EntrySide::Credit).unwrap();
    assert_eq!((debit.account.as_str(), debit.amount_cents), ("ACCOUNTS_RECEIVABLE", 4_000));
    assert_eq!((credit.account.as_str(), credit.amount_cents), ("CASH", 4_000));
    assert_eq!(credit.created_by.as_deref(), Some("manager"));
}

#[tokio::test]
async fn full_refund_reopens_invoice() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    h.billing.record_payment(cash(&invoice.id, 115)).await.unwrap();

    h.billing
        .process_refund(RefundRequest::new(&invoice.id, Money::from_major(115), "cancelled"))
        .await
        .unwrap();

    let after = h.billing.find_invoice(&invoice.id).await.unwrap();
    assert!(after.paid().is_zero());
    assert_eq!(after.balance(), after.total());
    assert_eq!(after.status, InvoiceStatus::Unpaid);
}

#[tokio::test]
async fn refund_cannot_exceed_paid() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    h.billing.record_payment(cash(&invoice.id, 30)).await.unwrap();

    let err = h
        .billing
        .process_refund(RefundRequest::new(&invoice.id, Money::from_major(31), "too much"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::RefundExceedsPaid);
    assert_eq!(payment_rows(&h.db).await, 1);
    assert_eq!(h.billing.find_invoice(&invoice.id).await.unwrap().paid(), Money::from_major(30));
}

#[tokio::test]
async fn method_without_strategy_is_unsupported() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    let cash_only = BillingService::with_strategies(
        h.db.clone(),
        BillingConfig::for_tests(),
        FuelPriceTable::standard(),
        StrategyRegistry::new().with(CashStrategy),
    );

    let err = cash_only
        .record_payment(
            PaymentRequest::new(&invoice.id, Money::from_major(40), PaymentMethod::Card)
                .reference("TERM123456"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::UnsupportedPaymentMethod);
    assert_eq!(err.to_string(), "Unsupported payment method: CARD");
    assert_eq!(payment_rows(&h.db).await, 0);
}

/// Accepts everything and then declines at the gateway.
#[derive(Debug)]
struct DecliningGateway;

impl PaymentStrategy for DecliningGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Online
    }

    fn account_name(&self) -> &'static str {
        "ONLINE_PAYMENTS"
    }

    fn validate(&self, _attempt: &PaymentAttempt) -> ValidationResult<()> {
        Ok(())
    }

    fn process(&self, _attempt: &PaymentAttempt, _now: DateTime<Utc>) -> ProcessingOutcome {
        ProcessingOutcome::failure("Gateway declined")
    }
}

#[tokio::test]
async fn processing_failure_rolls_back() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    let billing = BillingService::with_strategies(
        h.db.clone(),
        BillingConfig::for_tests(),
        FuelPriceTable::standard(),
        StrategyRegistry::standard().with(DecliningGateway),
    );

    let err = billing
        .record_payment(PaymentRequest::new(&invoice.id, Money::from_major(40), PaymentMethod::Online))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ProcessingFailed);
    assert_eq!(err.to_string(), "Payment processing failed: Gateway declined");
    assert_eq!(payment_rows(&h.db).await, 0);
    assert_eq!(ledger_rows(&h.db).await, 2);
    assert!(billing.find_invoice(&invoice.id).await.unwrap().paid().is_zero());
}

/// Cash that counts how many times it settled.
#[derive(Debug, Default)]
struct CountingCash {
    captures: Arc<AtomicUsize>,
}

impl PaymentStrategy for CountingCash {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Cash
    }

    fn account_name(&self) -> &'static str {
        "CASH"
    }

    fn validate(&self, attempt: &PaymentAttempt) -> ValidationResult<()> {
        CashStrategy.validate(attempt)
    }

    fn process(&self, attempt: &PaymentAttempt, now: DateTime<Utc>) -> ProcessingOutcome {
        self.captures.fetch_add(1, Ordering::SeqCst);
        CashStrategy.process(attempt, now)
    }
}

/// Aborts every `event` on `table` matching `when` until the trigger is dropped.
async fn break_writes(db: &Database, name: &str, event: &str, table: &str, when: &str) {
    let sql = format!(
        "CREATE TRIGGER {name} BEFORE {event} ON {table} WHEN {when} \
         BEGIN SELECT RAISE(ABORT, 'store unavailable'); END"
    );
    sqlx::query(&sql).execute(db.pool()).await.unwrap();
}

async fn drop_trigger(db: &Database, name: &str) {
    sqlx::query(&format!("DROP TRIGGER {name}"))
        .execute(db.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn store_failure_after_capture_rolls_back() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    let captures = Arc::new(AtomicUsize::new(0));
    let billing = BillingService::with_strategies(
        h.db.clone(),
        BillingConfig::for_tests(),
        FuelPriceTable::standard(),
        StrategyRegistry::new().with(CountingCash {
            captures: captures.clone(),
        }),
    );

    let failures = [
        ("fail_payment_insert", "INSERT", "payments", "1"),
        ("fail_invoice_update", "UPDATE", "invoices", "NEW.paid_cents <> OLD.paid_cents"),
        ("fail_ledger_insert", "INSERT", "finance_ledger", "NEW.account = 'CASH'"),
    ];

    for (attempt, (name, event, table, when)) in failures.into_iter().enumerate() {
        break_writes(&h.db, name, event, table, when).await;

        let err = billing.record_payment(cash(&invoice.id, 40)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal, "{}", name);
        assert_eq!(captures.load(Ordering::SeqCst), attempt + 1, "{}", name);

        assert_eq!(payment_rows(&h.db).await, 0, "{}", name);
        assert_eq!(ledger_rows(&h.db).await, 2, "{}", name);
        let after = billing.find_invoice(&invoice.id).await.unwrap();
        assert!(after.paid().is_zero(), "{}", name);
        assert_eq!(after.status, InvoiceStatus::Unpaid, "{}", name);

        drop_trigger(&h.db, name).await;
    }

    billing.record_payment(cash(&invoice.id, 40)).await.unwrap();
    assert_eq!(captures.load(Ordering::SeqCst), 4);
    assert_eq!(ledger_rows(&h.db).await, 4);
}

#[tokio::test]
async fn store_failure_during_refund_rolls_back() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    h.billing.record_payment(cash(&invoice.id, 100)).await.unwrap();

    break_writes(&h.db, "fail_refund_ledger", "INSERT", "finance_ledger", "NEW.amount_cents > 0").await;
    let err = h
        .billing
        .process_refund(RefundRequest::new(&invoice.id, Money::from_major(30), "wrong pump"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Internal);
    assert_eq!(payment_rows(&h.db).await, 1);
    assert_eq!(ledger_rows(&h.db).await, 4);
    assert_eq!(h.billing.find_invoice(&invoice.id).await.unwrap().paid(), Money::from_major(100));
}

#[tokio::test]
async fn paid_matches_recorded_payments() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;

    for major in [20, 35, 10] {
        h.billing.record_payment(cash(&invoice.id, major)).await.unwrap();
    }
    h.billing
        .process_refund(RefundRequest::new(&invoice.id, Money::from_major(15), "goodwill"))
        .await
        .unwrap();
    h.billing.record_payment(cash(&invoice.id, 5)).await.unwrap();

    let after = h.billing.find_invoice(&invoice.id).await.unwrap();
    let payments = h.billing.invoice_payments(&invoice.id).await.unwrap();
    let recorded: Money = payments.iter().map(|p| p.amount()).sum();

    assert_eq!(payments.len(), 5);
    assert_eq!(after.paid(), recorded);
    assert_eq!(after.paid(), Money::from_major(55));
    assert_eq!(after.balance(), after.total() - after.paid());
    assert!(h.finance.unbalanced_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn payment_queries() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    let first = h.billing.record_payment(cash(&invoice.id, 10)).await.unwrap();
    h.billing
        .record_payment(
            PaymentRequest::new(&invoice.id, Money::from_major(20), PaymentMethod::Card)
                .reference("TERM123456"),
        )
        .await
        .unwrap();

    assert_eq!(h.billing.list_payments().await.unwrap().len(), 2);
    assert_eq!(h.billing.payments_by_method(PaymentMethod::Card).await.unwrap().len(), 1);

    let found = h.billing.search_payments("CASH-").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, first.id);

    let totals = h.db.payments().totals_by_method(invoice.created_at, Utc::now()).await.unwrap();
    assert_eq!(totals[&PaymentMethod::Cash].total, Money::from_major(10));
    assert_eq!(totals[&PaymentMethod::Card].count, 1);
}

#[tokio::test]
async fn configured_latency_still_records_payment() {
    let h = harness().await;
    let invoice = service_invoice(&h).await;
    let config = BillingConfig {
        simulate_gateway_latency: true,
        ..BillingConfig::for_tests()
    };
    let billing = BillingService::new(h.db.clone(), config, FuelPriceTable::standard());

    billing
        .record_payment(
            PaymentRequest::new(&invoice.id, Money::from_major(40), PaymentMethod::Card)
                .reference("TERM123456"),
        )
        .await
        .unwrap();

    let reloaded = harness_on(h.db.clone());
    assert_eq!(
        reloaded.billing.find_invoice(&invoice.id).await.unwrap().paid(),
        Money::from_major(40)
    );
}
