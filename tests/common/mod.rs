#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use category_matcher_core::embedding::Encoder;
use category_matcher_core::{Catalog, CatalogEntry};

/// Encoder backed by a fixed text → vector table. Unknown texts fail.
pub struct TableEncoder {
    pub dims: usize,
    pub table: HashMap<String, Vec<f32>>,
}

impl TableEncoder {
    pub fn new(pairs: &[(&str, &[f32])]) -> Arc<dyn Encoder> {
        let table: HashMap<String, Vec<f32>> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect();
        let dims = table.values().next().map(Vec::len).unwrap_or(0);
        Arc::new(Self { dims, table })
    }
}

#[async_trait]
impl Encoder for TableEncoder {
    fn model_name(&self) -> &str {
        "table"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn encode_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                self.table
                    .get(t)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no vector for '{}'", t))
            })
            .collect()
    }
}

pub fn entry(id: &str, name: &str, category: &str, embedding: &[f32]) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        name: name.to_string(),
        category_path: category.to_string(),
        embedding: embedding.to_vec(),
    }
}

pub fn catalog(entries: Vec<CatalogEntry>) -> Arc<Catalog> {
    Arc::new(Catalog::new(entries).unwrap())
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
