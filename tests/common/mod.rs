#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use memmert_atmoweb::AtmoWebClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Stateful stand-in for an AtmoWEB controller.
///
/// Answers in the firmware's near-JSON dialect (bare keys, bare sentinels,
/// trailing comma) and only for the keys named in the query. Writes are
/// stored and echoed back exactly as sent.
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<HashMap<String, String>>>,
    ranges: HashMap<String, (f64, f64)>,
    flat_ranges: HashMap<String, (f64, f64)>,
    unsupported: HashSet<String>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, key: &str, min: f64, max: f64) -> Self {
        self.ranges.insert(key.to_string(), (min, max));
        self
    }

    /// Range reported the way older firmware does: `_RangeMin`/`_RangeMax`
    /// answered, `_Range` unknown.
    pub fn with_flat_range(mut self, key: &str, min: f64, max: f64) -> Self {
        self.flat_ranges.insert(key.to_string(), (min, max));
        self
    }

    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn unsupported(mut self, key: &str) -> Self {
        self.unsupported.insert(key.to_string());
        self
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().get(key).cloned()
    }

    pub async fn mount(&self, server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/atmoweb"))
            .respond_with(self.clone())
            .mount(server)
            .await;
    }
}

impl Respond for FakeDevice {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap();
        let mut parts = Vec::new();

        for (key, value) in request.url.query_pairs() {
            if let Some(base) = key.strip_suffix("_RangeMin") {
                if let Some((min, _)) = self.flat_ranges.get(base) {
                    parts.push(format!("{key}: {min}"));
                }
            } else if let Some(base) = key.strip_suffix("_RangeMax") {
                if let Some((_, max)) = self.flat_ranges.get(base) {
                    parts.push(format!("{key}: {max}"));
                }
            } else if let Some(base) = key.strip_suffix("_Range") {
                match self.ranges.get(base) {
                    Some((min, max)) => parts.push(format!("{key}: {{min: {min}, max: {max},}}")),
                    None => parts.push(format!("{key}: N/A")),
                }
            } else if self.unsupported.contains(&*key) {
                parts.push(format!("{key}: N/A"));
            } else if value.is_empty() {
                match state.get(&*key) {
                    Some(current) => parts.push(format!("{key}: {current}")),
                    None => parts.push(format!("{key}: N/D")),
                }
            } else {
                state.insert(key.to_string(), value.to_string());
                parts.push(format!("{key}: {value}"));
            }
        }

        ResponseTemplate::new(200).set_body_string(format!("{},\n", parts.join(", ")))
    }
}

pub fn client_for(server: &MockServer) -> AtmoWebClient {
    let addr = server.address();
    AtmoWebClient::builder(addr.ip().to_string())
        .port(addr.port())
        .build()
        .expect("client should build")
}

/// Query strings of every request the server received that wrote `key`.
pub async fn writes_to(server: &MockServer, key: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .flat_map(|r| {
            r.url
                .query_pairs()
                .filter(|(k, v)| k == key && !v.is_empty())
                .map(|(_, v)| v.into_owned())
                .collect::<Vec<_>>()
        })
        .collect()
}
