//! sdspi-store - Capacity reporting
//!
//! Space on the volume and the size of watched files, published once per
//! telemetry tick.

use log::debug;

use crate::card::CardDriver;
use crate::fat::FreeSpace;
use crate::lifecycle::MountManager;
use crate::telemetry::{names, TelemetrySink, UNAVAILABLE};

/// Bytes on the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl From<FreeSpace> for CapacitySnapshot {
    fn from(space: FreeSpace) -> Self {
        CapacitySnapshot {
            total_bytes: space.total_bytes(),
            used_bytes: space.used_bytes(),
            free_bytes: space.free_bytes(),
        }
    }
}

/// Binary size units, 1 KB = 1024 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUnit {
    Byte,
    KiloByte,
    MegaByte,
    GigaByte,
    TeraByte,
    PetaByte,
}

impl MemoryUnit {
    const ALL: [MemoryUnit; 6] = [
        MemoryUnit::Byte,
        MemoryUnit::KiloByte,
        MemoryUnit::MegaByte,
        MemoryUnit::GigaByte,
        MemoryUnit::TeraByte,
        MemoryUnit::PetaByte,
    ];

    pub fn bytes(self) -> u64 {
        match self {
            MemoryUnit::Byte => 1,
            MemoryUnit::KiloByte => 1 << 10,
            MemoryUnit::MegaByte => 1 << 20,
            MemoryUnit::GigaByte => 1 << 30,
            MemoryUnit::TeraByte => 1 << 40,
            MemoryUnit::PetaByte => 1 << 50,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            MemoryUnit::Byte => "B",
            MemoryUnit::KiloByte => "KB",
            MemoryUnit::MegaByte => "MB",
            MemoryUnit::GigaByte => "GB",
            MemoryUnit::TeraByte => "TB",
            MemoryUnit::PetaByte => "PB",
        }
    }

    /// `bytes` expressed in this unit.
    pub fn convert(self, bytes: u64) -> f64 {
        bytes as f64 / self.bytes() as f64
    }
}

/// Human readable size in the largest unit that keeps the value at least 1.
pub fn format_size(bytes: u64) -> String {
    let unit = MemoryUnit::ALL
        .iter()
        .rev()
        .copied()
        .find(|unit| bytes >= unit.bytes())
        .unwrap_or(MemoryUnit::Byte);
    match unit {
        MemoryUnit::Byte => format!("{} B", bytes),
        unit => format!("{:.2} {}", unit.convert(bytes), unit.suffix()),
    }
}

/// Publishes capacity figures and watched file sizes.
#[derive(Default)]
pub struct CapacityReporter {
    subscriptions: Vec<String>,
    telemetry: Option<Box<dyn TelemetrySink>>,
}

impl CapacityReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telemetry<T>(mut self, sink: T) -> Self
    where
        T: TelemetrySink + 'static,
    {
        self.telemetry = Some(Box::new(sink));
        self
    }

    /// Publish the size of `path` on every report. The same path may be
    /// watched more than once.
    pub fn watch_file(&mut self, path: impl Into<String>) {
        self.subscriptions.push(path.into());
    }

    pub fn watched_files(&self) -> &[String] {
        &self.subscriptions
    }

    /// Space on the volume, or `None` if unmounted or the query failed. A
    /// failed query unmounts the card.
    pub fn snapshot<D>(&self, manager: &mut MountManager<D>) -> Option<CapacitySnapshot>
    where
        D: CardDriver,
    {
        manager.query_free_space().map(CapacitySnapshot::from)
    }

    /// Size of `path` in bytes. An absent file reads as 0, and so does
    /// everything while unmounted.
    pub fn file_size<D>(&self, manager: &MountManager<D>, path: &str) -> u64
    where
        D: CardDriver,
    {
        manager
            .volume()
            .and_then(|volume| volume.file_size(path))
            .unwrap_or(0)
    }

    /// Publish a snapshot and every watched file size. Unmeasurable values
    /// go out as [`UNAVAILABLE`].
    pub fn report<D>(&mut self, manager: &mut MountManager<D>)
    where
        D: CardDriver,
    {
        let snapshot = self.snapshot(manager);
        let mounted = manager.is_mounted();
        let sizes: Vec<(String, f64)> = self
            .subscriptions
            .iter()
            .map(|path| {
                let size = if mounted {
                    self.file_size(manager, path) as f64
                } else {
                    UNAVAILABLE
                };
                (path.clone(), size)
            })
            .collect();

        let sink = match self.telemetry.as_mut() {
            Some(sink) => sink,
            None => return,
        };
        match snapshot {
            Some(snapshot) => {
                debug!("Capacity: {:?}", snapshot);
                sink.publish_number(names::TOTAL_SPACE, snapshot.total_bytes as f64);
                sink.publish_number(names::USED_SPACE, snapshot.used_bytes as f64);
                sink.publish_number(names::FREE_SPACE, snapshot.free_bytes as f64);
            }
            None => {
                sink.publish_number(names::TOTAL_SPACE, UNAVAILABLE);
                sink.publish_number(names::USED_SPACE, UNAVAILABLE);
                sink.publish_number(names::FREE_SPACE, UNAVAILABLE);
            }
        }
        for (path, size) in sizes {
            sink.publish_number(&path, size);
        }
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
