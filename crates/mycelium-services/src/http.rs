//! Outbound HTTP for scripts.
//!
//! Calls block the caller, so they are only made from the script worker
//! thread. Failures are reported to scripts as strings beginning with
//! `error:` rather than raised.

use mycelium_config::HttpConfig;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub struct HttpClient {
    config: HttpConfig,
    client: OnceLock<Result<Client, String>>,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    // The blocking client owns its own runtime and must not be built inside
    // an async context, so it is created on first use from the worker.
    fn client(&self) -> Result<&Client, String> {
        self.client
            .get_or_init(|| {
                Client::builder()
                    .timeout(self.config.timeout())
                    .user_agent(self.config.user_agent.clone())
                    .build()
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| e.clone())
    }

    pub fn get(&self, url: &str) -> String {
        debug!(target: "scripting", "HTTP GET {}", url);
        self.run(|client| client.get(url).send())
    }

    pub fn post_json(&self, url: &str, body: &str) -> String {
        debug!(target: "scripting", "HTTP POST (json) {}", url);
        self.run(|client| {
            client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string())
                .send()
        })
    }

    pub fn post_form(&self, url: &str, fields: &HashMap<String, String>) -> String {
        debug!(target: "scripting", "HTTP POST (form) {}", url);
        self.run(|client| client.post(url).form(fields).send())
    }

    fn run<F>(&self, request: F) -> String
    where
        F: FnOnce(&Client) -> reqwest::Result<reqwest::blocking::Response>,
    {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return format!("error: {}", e),
        };

        match request(client) {
            Ok(response) if response.status().is_success() => match response.text() {
                Ok(body) => body,
                Err(e) => format!("error: {}", e),
            },
            Ok(response) => {
                let status = response.status().as_u16();
                warn!(target: "scripting", "HTTP request returned status {}", status);
                format!("error: http {}", status)
            }
            Err(e) => {
                warn!(target: "scripting", "HTTP request failed: {}", e);
                format!("error: {}", e)
            }
        }
    }
}
