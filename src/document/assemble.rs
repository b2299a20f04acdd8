use super::{AUX_FIELD_KEY, DB_SIZE_KEY, TYPES_KEY};

/// Собирает итоговый документ из секций и сериализованного реестра типов.
///
/// Порядок всегда один: метаданные, статистика, записи, реестр. Пустые
/// входы пропускаются целиком, без заглушек; все пустые дают `[]`.
/// Входы должны быть уже проверенными JSON-фрагментами.
pub fn assemble(
    metadata: &str,
    size_stats: &str,
    entries: &str,
    type_registry: &str,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(4);

    if !metadata.trim().is_empty() {
        parts.push(labelled(AUX_FIELD_KEY, metadata));
    }
    if !size_stats.trim().is_empty() {
        parts.push(labelled(DB_SIZE_KEY, size_stats));
    }
    if !entries.trim().is_empty() {
        parts.push(format!("{{{entries}}}"));
    }
    if !type_registry.trim().is_empty() {
        parts.push(labelled(TYPES_KEY, type_registry));
    }

    format!("[{}]", parts.join(","))
}

fn labelled(
    label: &str,
    object: &str,
) -> String {
    format!("{{\"{label}\":{object}}}")
}
