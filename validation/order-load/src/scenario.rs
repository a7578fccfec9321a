//! Request templates: what a worker sends on each iteration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Header carrying the per-request identifier for the order-creation scenario.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP method of a templated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_reqwest().as_str())
    }
}

/// How the request body is produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyTemplate {
    #[default]
    Empty,
    /// A fixed JSON document sent verbatim.
    Json { content: serde_json::Value },
    /// A freshly built order payload.
    Order(OrderTemplate),
}

/// Parameters of the generated order: one line item for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTemplate {
    #[serde(default = "default_customer_code")]
    pub customer_code: String,
    #[serde(default = "default_sku")]
    pub sku: String,
    #[serde(default = "default_barcode")]
    pub barcode: String,
    #[serde(default = "default_qty")]
    pub qty: u32,
    #[serde(default = "default_amount")]
    pub amount: f64,
}

fn default_customer_code() -> String {
    "C001".to_string()
}

fn default_sku() -> String {
    "S001".to_string()
}

fn default_barcode() -> String {
    "B001".to_string()
}

fn default_qty() -> u32 {
    1
}

fn default_amount() -> f64 {
    1000.0
}

impl Default for OrderTemplate {
    fn default() -> Self {
        Self {
            customer_code: default_customer_code(),
            sku: default_sku(),
            barcode: default_barcode(),
            qty: default_qty(),
            amount: default_amount(),
        }
    }
}

impl OrderTemplate {
    pub fn payload(&self) -> OrderPayload {
        OrderPayload {
            customer_code: self.customer_code.clone(),
            items: vec![OrderItem {
                sku: self.sku.clone(),
                barcode: self.barcode.clone(),
                qty: self.qty,
                amount: self.amount,
            }],
            amount: self.amount * f64::from(self.qty),
        }
    }
}

/// Wire shape of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub customer_code: String,
    pub items: Vec<OrderItem>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub barcode: String,
    pub qty: u32,
    pub amount: f64,
}

/// Everything needed to build one request of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: BodyTemplate,
    /// When set, a fresh UUIDv4 is attached under this header name.
    #[serde(default)]
    pub request_id_header: Option<String>,
}

impl RequestTemplate {
    /// `POST /orders` with a generated order and a request id.
    pub fn create_order(order: OrderTemplate) -> Self {
        Self {
            method: HttpMethod::Post,
            path: "/orders".to_string(),
            headers: BTreeMap::new(),
            body: BodyTemplate::Order(order),
            request_id_header: Some(REQUEST_ID_HEADER.to_string()),
        }
    }

    /// `GET /orders/{id}`.
    pub fn get_order(order_id: &str) -> Self {
        Self {
            method: HttpMethod::Get,
            path: format!("/orders/{}", order_id),
            headers: BTreeMap::new(),
            body: BodyTemplate::Empty,
            request_id_header: None,
        }
    }

    /// Header names this template will send, for validation.
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers
            .keys()
            .map(String::as_str)
            .chain(self.request_id_header.as_deref())
    }

    /// Build the request for one iteration. Returns the request id that was
    /// attached, if any.
    pub fn build(
        &self,
        client: &reqwest::Client,
        url: &str,
    ) -> (reqwest::RequestBuilder, Option<Uuid>) {
        let mut builder = client.request(self.method.as_reqwest(), url);

        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let request_id = self
            .request_id_header
            .as_deref()
            .map(|name| (name, Uuid::new_v4()));
        if let Some((name, id)) = request_id {
            builder = builder.header(name, id.hyphenated().to_string());
        }

        builder = match &self.body {
            BodyTemplate::Empty => builder,
            BodyTemplate::Json { content } => builder.json(content),
            BodyTemplate::Order(order) => builder.json(&order.payload()),
        };

        (builder, request_id.map(|(_, id)| id))
    }
}
