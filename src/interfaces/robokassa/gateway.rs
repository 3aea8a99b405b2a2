use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::domain::money;
use crate::domain::ports::{PaymentGateway, PaymentInitiation, SecretUse, WebhookEvent};
use crate::domain::transaction::{PaymentMethod, Transaction};
use crate::error::{PaymentError, Result};
use crate::interfaces::robokassa::signature::{SignatureAlgorithm, SignaturePayload};

const PRODUCTION_BASE_URL: &str = "https://auth.robokassa.ru";
const TEST_BASE_URL: &str = "https://test.robokassa.ru";
const PAYMENT_PATH: &str = "Basket.aspx";

/// Fields the gateway must post for a notification to be processable.
pub const REQUIRED_WEBHOOK_FIELDS: [&str; 4] = ["InvId", "Sum", "SignatureValue", "MerchantLogin"];

/// Merchant credentials and mode for the Robokassa gateway.
///
/// The outbound secret (gateway password #1) signs payment requests; the
/// inbound secret (password #2) authenticates notifications. Verification
/// falls back to the outbound secret for configurations predating the split.
#[derive(Debug, Clone)]
pub struct RobokassaConfig {
    pub merchant_login: String,
    pub outbound_secret: String,
    pub inbound_secret: String,
    pub test_mode: bool,
    pub algorithm: SignatureAlgorithm,
}

impl RobokassaConfig {
    pub fn new(
        merchant_login: impl Into<String>,
        outbound_secret: impl Into<String>,
        inbound_secret: impl Into<String>,
    ) -> Self {
        Self {
            merchant_login: merchant_login.into(),
            outbound_secret: outbound_secret.into(),
            inbound_secret: inbound_secret.into(),
            test_mode: false,
            algorithm: SignatureAlgorithm::default(),
        }
    }

    /// Reads `ROBOKASSA_MERCHANT_LOGIN`, `ROBOKASSA_PASSWORD1`,
    /// `ROBOKASSA_PASSWORD2` and the optional `ROBOKASSA_TEST_MODE` flag.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            required_env("ROBOKASSA_MERCHANT_LOGIN")?,
            required_env("ROBOKASSA_PASSWORD1")?,
            required_env("ROBOKASSA_PASSWORD2")?,
        );
        config.test_mode = env::var("ROBOKASSA_TEST_MODE").is_ok_and(|value| value == "1");
        Ok(config)
    }

    pub fn base_url(&self) -> &'static str {
        if self.test_mode {
            TEST_BASE_URL
        } else {
            PRODUCTION_BASE_URL
        }
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key)
        .map_err(|_| PaymentError::ValidationError(format!("missing environment variable {key}")))
}

/// Optional customer contact fields passed through to the gateway.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Fully assembled outbound payment request.
#[derive(Debug, PartialEq, Clone)]
pub struct PaymentRequest {
    /// Parameters in wire order; `SignatureValue` is always last so the
    /// verification order is reproducible.
    pub params: Vec<(String, String)>,
    pub url: String,
}

/// Builds signed outbound payment requests and authenticates inbound
/// webhook notifications. Owns no transaction state.
#[derive(Debug, Clone)]
pub struct RobokassaClient {
    config: RobokassaConfig,
}

impl RobokassaClient {
    pub fn new(config: RobokassaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RobokassaConfig {
        &self.config
    }

    /// Assembles the outbound parameter set, signs it with the outbound
    /// secret, and returns the parameters plus the redirect URL.
    pub fn build_payment_request(
        &self,
        amount: Decimal,
        order_id: u64,
        description: &str,
        contact: &Contact,
        extra: &[(String, String)],
    ) -> Result<PaymentRequest> {
        let mut params: Vec<(String, String)> = vec![
            ("MerchantLogin".to_string(), self.config.merchant_login.clone()),
            ("Sum".to_string(), money::format_wire(amount)),
            ("InvId".to_string(), order_id.to_string()),
            ("Description".to_string(), description.to_string()),
            (
                "IsTest".to_string(),
                if self.config.test_mode { "1" } else { "0" }.to_string(),
            ),
        ];
        if let Some(email) = &contact.email {
            params.push(("Email".to_string(), email.clone()));
        }
        if let Some(phone) = &contact.phone {
            params.push(("Phone".to_string(), phone.clone()));
        }
        params.extend(extra.iter().cloned());

        let signature = SignaturePayload {
            merchant_login: &self.config.merchant_login,
            amount,
            order_id,
            extra,
        }
        .sign(self.config.algorithm, &self.config.outbound_secret);
        params.push(("SignatureValue".to_string(), signature));

        let mut url = Url::parse(self.config.base_url())
            .map_err(|err| PaymentError::GatewayError(err.to_string()))?
            .join(PAYMENT_PATH)
            .map_err(|err| PaymentError::GatewayError(err.to_string()))?;
        url.query_pairs_mut().extend_pairs(&params);

        debug!(order_id, amount = %params[1].1, "built payment request");
        Ok(PaymentRequest {
            params,
            url: url.to_string(),
        })
    }

    /// SBP variant: adds `PaymentMethod=SBP` (and the phone, when given) to
    /// the signed extra parameters. No other field changes.
    pub fn build_sbp_payment_request(
        &self,
        amount: Decimal,
        order_id: u64,
        description: &str,
        phone: Option<&str>,
    ) -> Result<PaymentRequest> {
        let mut extra = vec![("PaymentMethod".to_string(), "SBP".to_string())];
        if let Some(phone) = phone {
            extra.push(("Phone".to_string(), phone.to_string()));
        }
        self.build_payment_request(amount, order_id, description, &Contact::default(), &extra)
    }

    /// Validates the raw field mapping of an inbound notification.
    pub fn parse_webhook(&self, raw: &HashMap<String, String>) -> Result<InboundNotification> {
        for field in REQUIRED_WEBHOOK_FIELDS {
            if !raw.contains_key(field) {
                return Err(PaymentError::ValidationError(format!(
                    "missing required field: {field}"
                )));
            }
        }

        let order_id = required(raw, "InvId")?.parse::<u64>().map_err(|_| {
            PaymentError::ValidationError("InvId is not a numeric order id".to_string())
        })?;
        let amount = required(raw, "Sum")?.parse::<Decimal>().map_err(|_| {
            PaymentError::ValidationError("Sum is not a valid amount".to_string())
        })?;

        Ok(InboundNotification {
            order_id,
            amount,
            signature: required(raw, "SignatureValue")?.to_string(),
            merchant_login: required(raw, "MerchantLogin")?.to_string(),
            operation_id: raw.get("OperationId").cloned(),
            is_test: raw.get("IsTest").is_some_and(|value| value == "1"),
        })
    }

    /// Authenticates a parsed notification: signature first (inbound secret,
    /// then outbound fallback), then the merchant identity.
    pub fn authenticate(&self, notification: &InboundNotification) -> Result<WebhookEvent> {
        let payload = SignaturePayload {
            merchant_login: &self.config.merchant_login,
            amount: notification.amount,
            order_id: notification.order_id,
            extra: &[],
        };
        let verified_with = payload.verify(
            self.config.algorithm,
            &notification.signature,
            &self.config.inbound_secret,
            &self.config.outbound_secret,
        )?;

        if notification.merchant_login != self.config.merchant_login {
            warn!(
                order_id = notification.order_id,
                got = %notification.merchant_login,
                "merchant login mismatch in webhook"
            );
            return Err(PaymentError::MerchantMismatch {
                expected: self.config.merchant_login.clone(),
                got: notification.merchant_login.clone(),
            });
        }

        if verified_with == SecretUse::Outbound {
            info!(
                order_id = notification.order_id,
                "webhook authenticated with the outbound secret (legacy configuration)"
            );
        }

        Ok(WebhookEvent {
            order_id: notification.order_id,
            amount: notification.amount,
            operation_id: notification.operation_id.clone(),
            is_test: notification.is_test,
            verified_with,
        })
    }
}

/// Parsed but not yet authenticated notification fields.
#[derive(Debug, PartialEq, Clone)]
pub struct InboundNotification {
    pub order_id: u64,
    pub amount: Decimal,
    pub signature: String,
    pub merchant_login: String,
    pub operation_id: Option<String>,
    pub is_test: bool,
}

fn required<'a>(raw: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    raw.get(key)
        .map(String::as_str)
        .ok_or_else(|| PaymentError::ValidationError(format!("missing required field: {key}")))
}

fn payment_reference(method: PaymentMethod) -> String {
    let prefix = match method {
        PaymentMethod::Sbp => "SBP",
        _ => "PAY",
    };
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, hex[..12].to_uppercase())
}

#[async_trait]
impl PaymentGateway for RobokassaClient {
    async fn initiate(&self, tx: &Transaction) -> Result<PaymentInitiation> {
        let description = tx
            .description
            .clone()
            .unwrap_or_else(|| format!("Order {}", tx.id));
        let request = match tx.payment_method {
            PaymentMethod::Sbp => self.build_sbp_payment_request(
                tx.final_amount,
                tx.id.invoice_id(),
                &description,
                tx.metadata.get("phone").map(String::as_str),
            )?,
            _ => {
                let contact = Contact {
                    email: tx.metadata.get("email").cloned(),
                    phone: tx.metadata.get("phone").cloned(),
                };
                self.build_payment_request(
                    tx.final_amount,
                    tx.id.invoice_id(),
                    &description,
                    &contact,
                    &[],
                )?
            }
        };

        let reference = payment_reference(tx.payment_method);
        info!(id = %tx.id, %reference, "payment request prepared");
        Ok(PaymentInitiation {
            reference,
            payment_url: Some(request.url),
        })
    }

    fn authenticate_webhook(&self, raw: &HashMap<String, String>) -> Result<WebhookEvent> {
        let notification = self.parse_webhook(raw)?;
        self.authenticate(&notification)
    }
}
