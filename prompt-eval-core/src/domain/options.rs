use serde::{Deserialize, Serialize};

use super::evaluation::EvaluationStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub normal_count: usize,
    pub edge_count: usize,
    pub adversarial_count: usize,
    /// Seed forwarded to generators that support deterministic output.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl GeneratorOptions {
    pub fn total(&self) -> usize {
        self.normal_count + self.edge_count + self.adversarial_count
    }
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            normal_count: 15,
            edge_count: 8,
            adversarial_count: 5,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub max_concurrency: usize,
    pub timeout_seconds: u64,
    pub retry_count: u32,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            timeout_seconds: 30,
            retry_count: 1,
        }
    }
}

/// Per-evaluation overrides supplied at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvaluationOptions {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub generator: Option<GeneratorOptions>,
    #[serde(default)]
    pub executor: Option<ExecutorOptions>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    CreatedAt,
    UpdatedAt,
    Progress,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    #[serde(default)]
    pub order_by: ListOrder,
    #[serde(default)]
    pub status: Option<EvaluationStatus>,
    #[serde(default)]
    pub sort_desc: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            order_by: ListOrder::CreatedAt,
            status: None,
            sort_desc: true,
        }
    }
}
