//! Crop catalogue and crop-cycle arithmetic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crop {
    Lechuga,
    Espinaca,
    Rucula,
    Acelga,
    Albahaca,
    Mostaza,
}

impl Crop {
    pub const ALL: [Crop; 6] = [
        Crop::Lechuga,
        Crop::Espinaca,
        Crop::Rucula,
        Crop::Acelga,
        Crop::Albahaca,
        Crop::Mostaza,
    ];

    /// Maps the backend's crop id; unknown ids fall back to lettuce.
    pub fn from_remote_id(id: i64) -> Self {
        match id {
            1 => Crop::Lechuga,
            2 => Crop::Espinaca,
            3 => Crop::Rucula,
            4 => Crop::Acelga,
            5 => Crop::Albahaca,
            6 => Crop::Mostaza,
            _ => Crop::Lechuga,
        }
    }

    pub fn remote_id(self) -> i64 {
        match self {
            Crop::Lechuga => 1,
            Crop::Espinaca => 2,
            Crop::Rucula => 3,
            Crop::Acelga => 4,
            Crop::Albahaca => 5,
            Crop::Mostaza => 6,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Crop::Lechuga => "Lechuga",
            Crop::Espinaca => "Espinaca",
            Crop::Rucula => "Rúcula",
            Crop::Acelga => "Acelga",
            Crop::Albahaca => "Albahaca",
            Crop::Mostaza => "Mostaza",
        }
    }

    /// Length of a full growing cycle in days.
    pub fn total_days(self) -> u32 {
        match self {
            Crop::Lechuga => 45,
            Crop::Espinaca => 32,
            Crop::Rucula => 30,
            Crop::Acelga => 28,
            Crop::Albahaca => 30,
            Crop::Mostaza => 26,
        }
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A crop planted at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropCycle {
    pub crop: Crop,
    pub started_at: DateTime<Utc>,
}

impl CropCycle {
    pub fn new(crop: Crop, started_at: DateTime<Utc>) -> Self {
        Self { crop, started_at }
    }

    /// 1-based day of the cycle at `now`, clamped to `1..=total_days`.
    pub fn day_at(&self, now: DateTime<Utc>) -> u32 {
        let elapsed = (now - self.started_at).num_milliseconds().max(0);
        let day = elapsed / MILLIS_PER_DAY + 1;
        day.clamp(1, i64::from(self.crop.total_days())) as u32
    }

    /// Fraction of the cycle completed at `now`, in `(0, 1]`.
    pub fn progress_at(&self, now: DateTime<Utc>) -> f32 {
        self.day_at(now) as f32 / self.crop.total_days() as f32
    }

    pub fn remaining_days_at(&self, now: DateTime<Utc>) -> u32 {
        self.crop.total_days() - self.day_at(now)
    }

    pub fn is_finished_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_days_at(now) == 0
    }
}
