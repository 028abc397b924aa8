/// Разобрать "булево" значение из окружения
///
/// `1/true/yes/on` и `0/false/no/off` без учёта регистра, остальное -> None.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
