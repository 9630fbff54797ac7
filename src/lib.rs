//! LineFill: an interactive coloring engine for black-and-white line art.
//!
//! The engine keeps five pixel-aligned surfaces per image (see
//! [`canvas::LayerStack`]), fills closed regions with a boundary-aware
//! scanline fill, draws freehand pencil/eraser strokes, and records every
//! tool action in one undo/redo history. Mouse, touch and trackpad input is
//! reduced to a single contact model before it reaches the engine.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod engine;
pub mod input;
pub mod io;
pub mod logger;
pub mod ops;
pub mod settings;
pub mod viewport;

pub use engine::{ColoringEngine, EngineError, FillOutcome};
