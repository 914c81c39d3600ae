//! Server-Sent Events wire encoding
//!
//! Field order is fixed: `id`, `event`, `retry`, then `data`, and the frame
//! is terminated by a blank line.
use crate::models::Notification;
use std::fmt::{self, Write};

/// Encode a notification into a single event frame
pub fn encode(notification: &Notification) -> String {
    let mut frame = String::with_capacity(notification.data.len() + 32);
    // Writing into a String never fails
    let _ = write_frame(&mut frame, notification);
    frame
}

fn write_frame(out: &mut impl Write, notification: &Notification) -> fmt::Result {
    if let Some(id) = &notification.id {
        writeln!(out, "id: {}", id)?;
    }

    if let Some(event) = &notification.event {
        writeln!(out, "event: {}", event)?;
    }

    if let Some(retry) = notification.retry {
        writeln!(out, "retry: {}", retry)?;
    }

    // A bare newline inside the payload would end the frame early
    for line in notification.data.split('\n') {
        writeln!(out, "data: {}", line.strip_suffix('\r').unwrap_or(line))?;
    }

    out.write_char('\n')
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_frame(f, self)
    }
}
