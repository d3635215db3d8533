use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DomainDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub categories: Vec<String>,
}

impl DomainDescriptor {
    pub fn declares(&self, category: &str) -> bool {
        self.categories.iter().any(|declared| declared == category)
    }
}
