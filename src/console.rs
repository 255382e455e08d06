//! Human-readable rendering of devices, requests and run events

use devdeck_app::HistoryEntry;
use devdeck_core::{Device, DeviceListChange, ExecutionEvent, Request, RunStatus};

/// `id  status  [badges]`
pub fn format_device(device: &Device) -> String {
    let status = if device.raw_status.is_empty() {
        device.status.to_string()
    } else {
        device.raw_status.clone()
    };
    format!("{:<24} {:<12} {}", device.id, status, device.badges())
}

pub fn format_device_list(devices: &[Device]) -> Vec<String> {
    if devices.is_empty() {
        return vec!["No devices attached".to_string()];
    }
    devices.iter().map(format_device).collect()
}

/// Header line for a monitor update, followed by the device list
pub fn format_device_change(change: &DeviceListChange) -> Vec<String> {
    let mut lines = Vec::new();
    for id in &change.added {
        lines.push(format!("+ {}", id));
    }
    for id in &change.removed {
        lines.push(format!("- {}", id));
    }
    lines.extend(format_device_list(&change.devices));
    lines
}

pub fn format_request(request: &Request) -> Vec<String> {
    let mut lines = vec![format!("{} ({} step(s))", request.alias, request.steps.len())];
    for (index, record) in request.steps.iter().enumerate() {
        let opt_in = if record.local_dir == Some(true) {
            " [local_dir]"
        } else {
            ""
        };
        lines.push(format!(
            "  {}. {:<11} {}{}",
            index + 1,
            record.kind,
            record.value,
            opt_in
        ));
    }
    lines
}

pub fn format_history_entry(entry: &HistoryEntry) -> String {
    format!(
        "{}  {} ({} step(s))",
        entry.execute_time.format("%Y-%m-%d %H:%M:%S"),
        entry.alias,
        entry.steps.len()
    )
}

/// Render one run event; `None` for events with nothing to show
pub fn format_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::RunQueued { alias } => format!("⏳ {} queued", alias),
        ExecutionEvent::RunStarted { alias, device_id } => match device_id {
            Some(id) => format!("▶ {} on {}", alias, id),
            None => format!("▶ {}", alias),
        },
        ExecutionEvent::DeviceProbed {
            device_id,
            is_rooted,
            has_writable_overlay,
        } => format!(
            "  device {}: rooted={} overlay={}",
            device_id, is_rooted, has_writable_overlay
        ),
        ExecutionEvent::StepStarted { index, description } => {
            format!("[{}] $ {}", index + 1, description)
        }
        ExecutionEvent::OutputLine { text, is_error, .. } => {
            if *is_error {
                format!("  ! {}", text)
            } else {
                format!("    {}", text)
            }
        }
        ExecutionEvent::StepCompleted {
            index,
            exit_code,
            success,
        } => {
            if *success {
                return None;
            }
            match exit_code {
                Some(code) => format!("[{}] ✗ exited with {}", index + 1, code),
                None => format!("[{}] ✗ failed", index + 1),
            }
        }
        ExecutionEvent::StepSkipped { index, reason } => {
            format!("[{}] skipped: {}", index + 1, reason)
        }
        ExecutionEvent::RunCompleted { alias, status } => {
            let mark = match status {
                RunStatus::Succeeded => "✓",
                RunStatus::Cancelled => "■",
                _ => "✗",
            };
            format!("{} {} {}", mark, alias, status)
        }
    };
    Some(line)
}
