//! Device addressing table
//!
//! Maps the labels shown to the grower ("Bomba de agua", "Peristáltica A — FloraMicro")
//! onto the short identifiers the box controller listens for in its topic tree.
//! Resolution never fails: a label with no table entry is turned into a slug so the
//! caller always ends up with something it can put into a topic.

use tracing::debug;

/// Actuator labels registered on the box, in display order.
pub const DEFAULT_LABELS: [&str; 6] = [
    "Bomba de agua",
    "Ventilación",
    "Luz de cultivo",
    "Peristáltica A — FloraMicro",
    "Peristáltica B — FloraGrow",
    "Peristáltica C — FloraBloom",
];

// Identifier used when a label slugs down to nothing
const UNNAMED_DEVICE: &str = "unnamed";

#[derive(Debug, Clone, Copy)]
enum LabelMatch {
    Prefix(&'static str),
    Contains(&'static str),
}

impl LabelMatch {
    // `folded` is already trimmed and lowercased
    fn matches(&self, folded: &str) -> bool {
        match self {
            LabelMatch::Prefix(p) => folded.starts_with(p),
            LabelMatch::Contains(c) => folded.contains(c),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DeviceAddress {
    label: LabelMatch,
    device_id: &'static str,
}

// First match wins, so prefix rules are checked before substring rules
const DEVICE_TABLE: [DeviceAddress; 6] = [
    DeviceAddress {
        label: LabelMatch::Prefix("bomba"),
        device_id: "pump",
    },
    DeviceAddress {
        label: LabelMatch::Prefix("ventilaci"),
        device_id: "fan",
    },
    DeviceAddress {
        label: LabelMatch::Prefix("luz"),
        device_id: "light",
    },
    DeviceAddress {
        label: LabelMatch::Contains("micro"),
        device_id: "doser_a",
    },
    DeviceAddress {
        label: LabelMatch::Contains("grow"),
        device_id: "doser_b",
    },
    DeviceAddress {
        label: LabelMatch::Contains("bloom"),
        device_id: "doser_c",
    },
];

/// Resolves a display label to the device identifier used in topics.
pub fn resolve(label: &str) -> String {
    let folded = label.trim().to_lowercase();

    if let Some(entry) = DEVICE_TABLE.iter().find(|e| e.label.matches(&folded)) {
        debug!("Resolved '{}' to known device '{}'", label, entry.device_id);
        return entry.device_id.to_string();
    }

    let slug = slugify(label);
    debug!("No table entry for '{}', using slug '{}'", label, slug);
    slug
}

/// Lowercases the label and collapses every run of non-alphanumeric characters
/// into a single underscore. Leading and trailing underscores are dropped.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_separator = false;

    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        UNNAMED_DEVICE.to_string()
    } else {
        slug
    }
}
