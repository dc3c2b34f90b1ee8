//! sdspi-store - Telemetry sink
//!
//! Values the storage layer reports about itself: card type and presence,
//! capacity figures and watched file sizes. A manager without a sink simply
//! reports nothing.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;

/// Published in place of a number that could not be measured.
pub const UNAVAILABLE: f64 = f64::NAN;

/// Well known value names.
pub mod names {
    pub const CARD_TYPE: &str = "card_type";
    pub const CARD_PRESENT: &str = "card_present";
    pub const CARD_STATUS: &str = "card_status";
    pub const TOTAL_SPACE: &str = "total_space";
    pub const USED_SPACE: &str = "used_space";
    pub const FREE_SPACE: &str = "free_space";
}

/// Receives named values.
pub trait TelemetrySink {
    fn publish_number(&mut self, name: &str, value: f64);
    fn publish_text(&mut self, name: &str, value: &str);
    fn publish_flag(&mut self, name: &str, value: bool);
}

impl<T> TelemetrySink for Rc<RefCell<T>>
where
    T: TelemetrySink,
{
    fn publish_number(&mut self, name: &str, value: f64) {
        self.borrow_mut().publish_number(name, value)
    }

    fn publish_text(&mut self, name: &str, value: &str) {
        self.borrow_mut().publish_text(name, value)
    }

    fn publish_flag(&mut self, name: &str, value: bool) {
        self.borrow_mut().publish_flag(name, value)
    }
}

/// Writes every value to the log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish_number(&mut self, name: &str, value: f64) {
        if value.is_nan() {
            info!("{}: unavailable", name);
        } else {
            info!("{}: {}", name, value);
        }
    }

    fn publish_text(&mut self, name: &str, value: &str) {
        info!("{}: {}", name, value);
    }

    fn publish_flag(&mut self, name: &str, value: bool) {
        info!("{}: {}", name, if value { "on" } else { "off" });
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
