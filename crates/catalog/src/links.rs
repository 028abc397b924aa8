use crate::types::{DomainNode, GraphSnapshotPayload};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Тип ребра графа
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    /// Домен -> поддомен
    Contains,
    /// Модуль -> домен
    BelongsTo,
    /// Модуль -> модуль
    DependsOn,
    /// Модуль -> артефакт
    Produces,
    /// Артефакт -> модуль-потребитель
    ConsumedBy,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub kind: LinkKind,
}

/// Построить список рёбер для отрисовки
///
/// Ссылки на отсутствующие узлы пропускаются, дубликаты схлопываются.
pub fn derive_links(snapshot: &GraphSnapshotPayload) -> Vec<GraphLink> {
    let mut domain_ids = HashSet::new();
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |source: &str, target: &str, kind: LinkKind, links: &mut Vec<GraphLink>| {
        let link = GraphLink {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        };
        if seen.insert(link.clone()) {
            links.push(link);
        }
    };

    let mut stack: Vec<&DomainNode> = snapshot.domains.iter().rev().collect();
    while let Some(domain) = stack.pop() {
        domain_ids.insert(domain.id.as_str());
        for child in &domain.children {
            push(&domain.id, &child.id, LinkKind::Contains, &mut links);
        }
        stack.extend(domain.children.iter().rev());
    }

    let module_ids: HashSet<&str> = snapshot.modules.iter().map(|m| m.id.as_str()).collect();
    let artifact_ids: HashSet<&str> = snapshot.artifacts.iter().map(|a| a.id.as_str()).collect();

    for module in &snapshot.modules {
        for domain in module.domain_ids().filter(|d| domain_ids.contains(d)) {
            push(&module.id, domain, LinkKind::BelongsTo, &mut links);
        }
        for dep in module.dependency_ids().filter(|d| module_ids.contains(d)) {
            push(&module.id, dep, LinkKind::DependsOn, &mut links);
        }
        for artifact in module.produced_ids().filter(|a| artifact_ids.contains(a)) {
            push(&module.id, artifact, LinkKind::Produces, &mut links);
        }
    }

    for artifact in &snapshot.artifacts {
        if let Some(producer) = artifact.producer_id().filter(|p| module_ids.contains(p)) {
            push(producer, &artifact.id, LinkKind::Produces, &mut links);
        }
        for consumer in artifact.consumer_ids().filter(|c| module_ids.contains(c)) {
            push(&artifact.id, consumer, LinkKind::ConsumedBy, &mut links);
        }
    }

    links
}
