//! An in-memory stand-in for Azure Resource Manager.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apim::{ArmClient, ProviderContext};
use serde_json::{Value, json};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
pub const SERVICE: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc";

/// PUT stores the body, GET returns it, DELETE drops it.
#[derive(Clone, Default)]
pub struct FakeArm {
    entities: Arc<Mutex<HashMap<String, Value>>>,
    accepted: Arc<Mutex<Option<(String, String)>>>,
    provisioning: Arc<Mutex<Option<String>>>,
}

impl FakeArm {
    /// Mounted at the lowest priority so specific mocks win.
    pub async fn mount(server: &MockServer) -> Self {
        let fake = FakeArm::default();
        Mock::given(any())
            .respond_with(fake.clone())
            .with_priority(10)
            .mount(server)
            .await;
        fake
    }

    pub fn seed(&self, path: &str, body: Value) {
        self.entities
            .lock()
            .unwrap()
            .insert(path.to_string(), with_identity(path, body));
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.entities.lock().unwrap().get(path).cloned()
    }

    pub fn remove(&self, path: &str) {
        self.entities.lock().unwrap().remove(path);
    }

    /// Answer writes with 202 and a polling header, still applying them.
    pub fn accept_with_header(&self, name: &str, value: impl Into<String>) {
        *self.accepted.lock().unwrap() = Some((name.to_string(), value.into()));
    }

    /// Report this provisioning state in PUT responses only.
    pub fn report_provisioning(&self, state: &str) {
        *self.provisioning.lock().unwrap() = Some(state.to_string());
    }

    fn write_response(&self, status: u16, body: Option<Value>) -> ResponseTemplate {
        let accepted = self.accepted.lock().unwrap().clone();
        let mut template = match accepted {
            Some((name, value)) => ResponseTemplate::new(202).insert_header(name.as_str(), value.as_str()),
            None => ResponseTemplate::new(status),
        };
        if let Some(mut body) = body {
            if let Some(state) = self.provisioning.lock().unwrap().clone() {
                body["properties"]["provisioningState"] = json!(state);
            }
            template = template.set_body_json(body);
        }
        template
    }
}

fn with_identity(path: &str, mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("id".to_string(), json!(path));
        let name = path.rsplit('/').next().unwrap_or_default();
        map.insert("name".to_string(), json!(name));
    }
    body
}

pub fn not_found(path: &str) -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": {
            "code": "ResourceNotFound",
            "message": format!("{} was not found", path)
        }
    }))
}

impl Respond for FakeArm {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let path = request.url.path().to_string();
        let mut entities = self.entities.lock().unwrap();

        match request.method.as_str() {
            "GET" => match entities.get(&path) {
                Some(body) => ResponseTemplate::new(200).set_body_json(body),
                None => not_found(&path),
            },
            "PUT" => {
                let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
                let created = !entities.contains_key(&path);
                let stored = with_identity(&path, body);
                entities.insert(path, stored.clone());
                drop(entities);
                self.write_response(if created { 201 } else { 200 }, Some(stored))
            }
            "DELETE" => {
                let existed = entities.remove(&path).is_some();
                drop(entities);
                self.write_response(if existed { 200 } else { 204 }, None)
            }
            _ => ResponseTemplate::new(405),
        }
    }
}

pub fn context(server: &MockServer) -> ProviderContext {
    let client = ArmClient::with_base_url("test_token".to_string(), server.uri()).unwrap();
    ProviderContext::new(client, SUBSCRIPTION).with_poll_interval(Duration::from_millis(10))
}

pub fn child(path: &str) -> String {
    format!("{}{}", SERVICE, path)
}
