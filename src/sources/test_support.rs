//! Fixtures shared by the source tests: an in-memory upstream API and a
//! scripted one-shot HTTP server.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::FetchError;
use crate::sources::fetcher::JsonFetch;

pub const STUB_BASE: &str = "http://stub.local/api";

/// In-memory upstream. Unknown URLs answer like a 404 that exhausted its retries;
/// URLs marked with [`StubApi::fail`] answer like a 503 that did.
#[derive(Default)]
pub struct StubApi {
    routes: HashMap<String, Value>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StubApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: impl Into<String>, body: Value) -> Self {
        self.routes.insert(url.into(), body);
        self
    }

    pub fn fail(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Register a full brand -> model -> year -> price tree for one category.
    /// Every price is `R$ 10.000,00` plus 100 per year past 2000.
    pub fn category_tree(
        mut self,
        category: &str,
        brands: &[(&str, &str, &[(u32, &str)])],
        years: RangeInclusive<i32>,
    ) -> Self {
        let root = format!("{STUB_BASE}/{category}/marcas");
        let brand_list: Vec<Value> = brands
            .iter()
            .map(|(code, name, _)| json!({"codigo": code, "nome": name}))
            .collect();
        self.routes.insert(root.clone(), Value::Array(brand_list));

        for (brand_code, brand_name, models) in brands {
            let models_url = format!("{root}/{brand_code}/modelos");
            let model_list: Vec<Value> = models
                .iter()
                .map(|(code, name)| json!({"codigo": code, "nome": name}))
                .collect();
            self.routes
                .insert(models_url.clone(), json!({"modelos": model_list, "anos": []}));

            for (model_code, model_name) in models.iter() {
                let years_url = format!("{models_url}/{model_code}/anos");
                let year_list: Vec<Value> = years
                    .clone()
                    .map(|y| json!({"codigo": format!("{y}-1"), "nome": format!("{y} Gasolina")}))
                    .collect();
                self.routes.insert(years_url.clone(), Value::Array(year_list));
                for y in years.clone() {
                    let reais = 10_000 + 100 * (y - 2000);
                    self.routes.insert(
                        format!("{years_url}/{y}-1"),
                        json!({
                            "Valor": format!("R$ {}.{:03},00", reais / 1000, reais % 1000),
                            "Marca": brand_name,
                            "Modelo": model_name,
                            "AnoModelo": y,
                            "CodigoFipe": format!("{brand_code}{model_code}-{y}"),
                        }),
                    );
                }
            }
        }
        self
    }
}

fn exhausted(url: &str, status: u16) -> FetchError {
    FetchError::Exhausted {
        url: url.to_string(),
        attempts: 3,
        last: Box::new(FetchError::Status {
            url: url.to_string(),
            status,
        }),
    }
}

#[async_trait]
impl JsonFetch for StubApi {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        if self.failing.contains(url) {
            return Err(exhausted(url, 503));
        }
        self.routes
            .get(url)
            .cloned()
            .ok_or_else(|| exhausted(url, 404))
    }
}

pub fn http_response(status: u16, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status} X\r\n");
    for (k, v) in headers {
        out.push_str(&format!("{k}: {v}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    out
}

/// Serve `responses` in order, one connection each, then stop accepting.
/// The handle resolves to the request paths seen.
pub async fn spawn_scripted_http(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let mut paths = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.expect("read request");
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let head = String::from_utf8_lossy(&buf);
            let path = head
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or_default()
                .to_string();
            paths.push(path);
            stream
                .write_all(response.as_bytes())
                .await
                .expect("write response");
            let _ = stream.shutdown().await;
        }
        paths
    });
    (format!("http://{addr}"), handle)
}
