//! Нормализация раскладки графа.
//!
//! Раскладка - вспомогательные данные: битые координаты молча
//! отбрасываются и никогда не приводят к ошибке записи.

use crate::types::{GraphLayoutSnapshot, LayoutPosition};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Нормализовать типизированную раскладку
///
/// Запись удаляется целиком, если `x` или `y` не конечны. `fx`/`fy`
/// проверяются независимо. Если не осталось ни одной записи, возвращается
/// `None`, а не пустая карта.
pub fn normalize_layout(layout: Option<&GraphLayoutSnapshot>) -> Option<GraphLayoutSnapshot> {
    let layout = layout?;
    let normalized: GraphLayoutSnapshot = layout
        .iter()
        .filter_map(|(id, position)| {
            sanitize_position(
                Some(position.x),
                Some(position.y),
                position.fx,
                position.fy,
            )
            .map(|p| (id.clone(), p))
        })
        .collect();

    non_empty(normalized)
}

/// Нормализовать раскладку из произвольного JSON (хранилище или сеть)
pub fn normalize_layout_value(value: &Value) -> Option<GraphLayoutSnapshot> {
    let entries = value.as_object()?;
    let normalized: GraphLayoutSnapshot = entries
        .iter()
        .filter_map(|(id, raw)| {
            let raw = raw.as_object()?;
            let coord = |key: &str| raw.get(key).and_then(coerce_number);
            sanitize_position(coord("x"), coord("y"), coord("fx"), coord("fy"))
                .map(|p| (id.clone(), p))
        })
        .collect();

    non_empty(normalized)
}

/// Для `#[serde(deserialize_with)]`: любой JSON превращается в нормализованную раскладку
pub fn deserialize_layout<'de, D>(deserializer: D) -> Result<Option<GraphLayoutSnapshot>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(normalize_layout_value))
}

fn sanitize_position(
    x: Option<f64>,
    y: Option<f64>,
    fx: Option<f64>,
    fy: Option<f64>,
) -> Option<LayoutPosition> {
    let x = x.filter(|v| v.is_finite())?;
    let y = y.filter(|v| v.is_finite())?;

    Some(LayoutPosition {
        x,
        y,
        fx: fx.filter(|v| v.is_finite()),
        fy: fy.filter(|v| v.is_finite()),
    })
}

/// Числа как есть, числовые строки разбираются, всё остальное не число
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn non_empty(layout: GraphLayoutSnapshot) -> Option<GraphLayoutSnapshot> {
    if layout.is_empty() {
        None
    } else {
        Some(layout)
    }
}
