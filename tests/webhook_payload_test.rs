//! Webhook载荷与签名测试（无外部依赖）

use chrono::{Duration, Utc};
use ironramp::{
    domain::{
        event::PaymentEvent,
        payment::{Corridor, FeeBreakdown, FeeHandling, Payment, PaymentMethod, PaymentStatus},
        webhook::WebhookPayload,
    },
    security::webhook_signer,
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn sample_payment() -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        source_currency: "USD".into(),
        destination_currency: Corridor::Mxn,
        amount: dec("100.00"),
        payment_method: PaymentMethod::Ach,
        fee_handling: FeeHandling::Inclusive,
        fees: FeeBreakdown {
            onramp: dec("0.00"),
            corridor: dec("1.00"),
            platform: dec("3.49"),
            network_gas: dec("0.05"),
            total: dec("4.54"),
        },
        usdc_sent: dec("95.46"),
        exchange_rate: dec("17.234"),
        destination_amount: dec("1645.16"),
        quote_id: Some(Uuid::new_v4()),
        quote_expires_at: now + Duration::seconds(60),
        status: PaymentStatus::OnrampCompleted,
        onramp_tx_id: Some("onramp_tx_1".into()),
        offramp_tx_id: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}

#[test]
fn test_payload_envelope_carries_payment_snapshot() {
    let payment = sample_payment();
    let event = PaymentEvent::for_transition(
        payment.id,
        payment.status,
        serde_json::json!({"onramp_tx_id": "onramp_tx_1"}),
        payment.updated_at,
    );

    let payload = WebhookPayload::freeze(&payment, &event, "2025-03-01");

    assert_eq!(payload.id, event.id);
    assert_eq!(payload.event_type, "onramp.completed");
    assert_eq!(payload.api_version, "2025-03-01");
    assert_eq!(payload.data.payment_id, payment.id);
    assert_eq!(payload.data.status, PaymentStatus::OnrampCompleted);
    assert_eq!(payload.data.usdc_sent, dec("95.46"));
    assert_eq!(payload.data.onramp_tx_id.as_deref(), Some("onramp_tx_1"));
    assert!(payload.data.offramp_tx_id.is_none());
}

#[test]
fn test_payload_signature_round_trip() {
    let payment = sample_payment();
    let event = PaymentEvent::for_transition(
        payment.id,
        payment.status,
        serde_json::json!({}),
        payment.updated_at,
    );
    let payload = WebhookPayload::freeze(&payment, &event, "2025-03-01");

    let secret = "shared_webhook_secret";
    let body = serde_json::to_string(&payload).unwrap();
    let signature = webhook_signer::sign_payload(&body, secret).unwrap();

    // 消费端以同样的密钥验证
    assert!(webhook_signer::verify_signature(&body, &signature, secret).is_ok());
    assert!(webhook_signer::verify_signature(&body, &signature, "wrong_secret").is_err());
}

#[test]
fn test_payload_json_shape() {
    let payment = sample_payment();
    let event = PaymentEvent::for_transition(
        payment.id,
        payment.status,
        serde_json::json!({}),
        payment.updated_at,
    );
    let payload = WebhookPayload::freeze(&payment, &event, "2025-03-01");
    let value = serde_json::to_value(&payload).unwrap();

    assert!(value.get("id").is_some());
    assert!(value.get("event_type").is_some());
    assert!(value.get("api_version").is_some());
    assert!(value.get("created_at").is_some());

    let data = value.get("data").unwrap();
    for field in [
        "payment_id",
        "status",
        "amount",
        "destination_currency",
        "exchange_rate",
        "fees",
        "usdc_sent",
        "destination_amount",
        "created_at",
        "updated_at",
    ] {
        assert!(data.get(field).is_some(), "missing field {field}");
    }
    assert_eq!(
        data.get("status").unwrap(),
        &serde_json::json!("ONRAMP_COMPLETED")
    );
    assert_eq!(
        data.get("destination_currency").unwrap(),
        &serde_json::json!("MXN")
    );
}
