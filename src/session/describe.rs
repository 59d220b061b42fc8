use super::schema::{FileSlot, SlotStatus};

/// Short status line shown next to a slot.
pub fn status_label(slot: &FileSlot) -> String {
    match slot.status {
        SlotStatus::Uploading => "Uploading...".to_string(),
        SlotStatus::Removing => "Removing...".to_string(),
        SlotStatus::Completed => "Ready".to_string(),
        SlotStatus::Error => slot
            .error_message
            .clone()
            .unwrap_or_else(|| "Upload failed".to_string()),
    }
}

/// Human readable size, e.g. `1.4 MB`.
pub fn format_size(size_bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size_bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// One display line for a slot: name, size, upload time and status.
pub fn describe_slot(slot: &FileSlot) -> String {
    let uploaded = slot
        .uploaded_at
        .map(|at| format!(", uploaded {}", at.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!(
        "{} ({}{}) - {}",
        slot.local_name,
        format_size(slot.size_bytes),
        uploaded,
        status_label(slot)
    )
}
