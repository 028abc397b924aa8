use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Текущая версия формата снапшота
pub const CURRENT_SNAPSHOT_VERSION: i64 = 1;

/// Узел дерева доменов
///
/// Пустой `children` не сериализуется: после чтения из базы лист
/// выглядит так же, как лист, собранный вручную.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainNode {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DomainNode>,
}

impl DomainNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            children: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_children(mut self, children: Vec<DomainNode>) -> Self {
        self.children = children;
        self
    }
}

/// Строковые элементы массива `key`; прочие элементы пропускаются
fn string_items<'a>(fields: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a str> {
    fields
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Программный модуль
///
/// Для хранилища это непрозрачная запись: обязателен только строковый `id`,
/// всё остальное лежит в `fields` как пришло и возвращается без изменений.
/// Методы-аксессоры лишь читают известные поля, ничего не проверяя.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ModuleNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
        .with_field("name", Value::String(name.into()))
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// Домены, к которым относится модуль
    pub fn domain_ids(&self) -> impl Iterator<Item = &str> {
        string_items(&self.fields, "domains")
    }

    /// Модули, от которых зависит этот: строка или объект с `moduleId`
    pub fn dependency_ids(&self) -> impl Iterator<Item = &str> {
        self.fields
            .get("dependencies")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|dep| match dep {
                Value::String(id) => Some(id.as_str()),
                Value::Object(object) => object.get("moduleId").and_then(Value::as_str),
                _ => None,
            })
    }

    pub fn produced_ids(&self) -> impl Iterator<Item = &str> {
        string_items(&self.fields, "produces")
    }
}

/// Артефакт данных, такой же непрозрачный, как [`ModuleNode`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactNode {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ArtifactNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
        .with_field("name", Value::String(name.into()))
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    pub fn producer_id(&self) -> Option<&str> {
        self.fields.get("producerId").and_then(Value::as_str)
    }

    pub fn consumer_ids(&self) -> impl Iterator<Item = &str> {
        string_items(&self.fields, "consumerIds")
    }
}

/// Позиция узла на графе, `fx`/`fy` - закреплённая позиция
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutPosition {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f64>,
}

impl LayoutPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, fx: None, fy: None }
    }

    pub fn pinned(x: f64, y: f64, fx: f64, fy: f64) -> Self {
        Self {
            x,
            y,
            fx: Some(fx),
            fy: Some(fy),
        }
    }
}

/// Раскладка графа: id узла -> позиция
pub type GraphLayoutSnapshot = BTreeMap<String, LayoutPosition>;

/// Полный снапшот графа - единица обмена между UI, HTTP и хранилищем
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshotPayload {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_version"
    )]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    pub domains: Vec<DomainNode>,
    pub modules: Vec<ModuleNode>,
    pub artifacts: Vec<ArtifactNode>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::layout::deserialize_layout"
    )]
    pub layout: Option<GraphLayoutSnapshot>,
}

impl GraphSnapshotPayload {
    pub fn new(
        domains: Vec<DomainNode>,
        modules: Vec<ModuleNode>,
        artifacts: Vec<ArtifactNode>,
    ) -> Self {
        Self {
            version: None,
            exported_at: None,
            domains,
            modules,
            artifacts,
            layout: None,
        }
    }

    pub fn with_layout(mut self, layout: GraphLayoutSnapshot) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Общее число доменов во всём дереве
    pub fn domain_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&DomainNode> = self.domains.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// Версия принимается числом или числовой строкой, остальное считается отсутствующим
fn deserialize_version<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}
