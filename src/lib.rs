//! Live pressure monitor core: rolling sample window, chart/table display
//! adapter and spreadsheet snapshot export. The egui front end (the binary's
//! `gui.rs`) only feeds events in and draws what comes out.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod types;
