// ============================================================================
// INPUT - mouse / touch / trackpad reduced to one contact model
// ============================================================================

use std::collections::HashSet;

use egui::{Pos2, Vec2};

use crate::viewport::ViewMode;

pub const DEFAULT_WHEEL_ZOOM_STEP: f32 = 1.1;

/// Pinches whose contacts are closer than this do not zoom.
const MIN_PINCH_DISTANCE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContactId {
    Mouse,
    Touch(u64),
}

/// Source-independent input. Positions are view-relative screen points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Down { id: ContactId, pos: Pos2 },
    Move { id: ContactId, pos: Pos2 },
    Up { id: ContactId, pos: Pos2 },
    Cancel { id: ContactId },
    /// Vertical wheel motion; positive scrolls up (zoom in).
    Wheel { pos: Pos2, delta: f32 },
    /// Trackpad pinch or ctrl+wheel, already expressed as a scale factor.
    Magnify { factor: f32, pos: Pos2 },
}

/// What the engine should do in response to input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureAction {
    ToolPress(Pos2),
    ToolDrag(Pos2),
    ToolRelease(Pos2),
    /// The tool gesture turned into something else; undo its effects.
    ToolCancel,
    Pan(Vec2),
    Zoom { factor: f32, focal: Pos2 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SingleRole {
    Tool,
    Pan,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    Idle,
    Single {
        id: ContactId,
        last: Pos2,
        role: SingleRole,
    },
    Pinch {
        a: (ContactId, Pos2),
        b: (ContactId, Pos2),
    },
    /// One pinch contact lifted; the other is ignored until it lifts too.
    Draining { id: ContactId, last: Pos2 },
}

/// Contact-count state machine:
/// `Idle -> Single -> (tool | pan)`, `Idle/Single -> Pinch -> Draining -> Idle`.
/// A third simultaneous contact is ignored.
#[derive(Clone, Debug)]
pub struct GestureTracker {
    phase: Phase,
    wheel_step: f32,
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WHEEL_ZOOM_STEP)
    }
}

impl GestureTracker {
    pub fn new(wheel_step: f32) -> Self {
        let wheel_step = if wheel_step.is_finite() && wheel_step > 1.0 {
            wheel_step
        } else {
            DEFAULT_WHEEL_ZOOM_STEP
        };
        Self {
            phase: Phase::Idle,
            wheel_step,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn is_pinching(&self) -> bool {
        matches!(self.phase, Phase::Pinch { .. })
    }

    /// Number of contacts currently tracked (ignored extras excluded).
    pub fn contact_count(&self) -> usize {
        match self.phase {
            Phase::Idle => 0,
            Phase::Single { .. } | Phase::Draining { .. } => 1,
            Phase::Pinch { .. } => 2,
        }
    }

    /// Drop any gesture in progress, e.g. when the image changes.
    pub fn reset(&mut self) -> Option<GestureAction> {
        let was_tool = matches!(
            self.phase,
            Phase::Single {
                role: SingleRole::Tool,
                ..
            }
        );
        self.phase = Phase::Idle;
        was_tool.then_some(GestureAction::ToolCancel)
    }

    pub fn handle(&mut self, event: InputEvent, mode: ViewMode) -> Vec<GestureAction> {
        match event {
            InputEvent::Down { id, pos } => self.on_down(id, pos, mode),
            InputEvent::Move { id, pos } => self.on_move(id, pos),
            InputEvent::Up { id, pos } => self.on_up(id, pos),
            InputEvent::Cancel { id } => self.on_cancel(id),
            InputEvent::Wheel { pos, delta } => {
                if mode != ViewMode::Zoom || delta == 0.0 || !delta.is_finite() {
                    return Vec::new();
                }
                let factor = if delta > 0.0 {
                    self.wheel_step
                } else {
                    1.0 / self.wheel_step
                };
                vec![GestureAction::Zoom { factor, focal: pos }]
            }
            InputEvent::Magnify { factor, pos } => {
                if !factor.is_finite() || factor <= 0.0 || factor == 1.0 {
                    return Vec::new();
                }
                vec![GestureAction::Zoom { factor, focal: pos }]
            }
        }
    }

    fn on_down(&mut self, id: ContactId, pos: Pos2, mode: ViewMode) -> Vec<GestureAction> {
        match self.phase {
            Phase::Idle => {
                let role = match mode {
                    ViewMode::Draw => SingleRole::Tool,
                    ViewMode::Zoom => SingleRole::Pan,
                };
                self.phase = Phase::Single { id, last: pos, role };
                match role {
                    SingleRole::Tool => vec![GestureAction::ToolPress(pos)],
                    SingleRole::Pan => Vec::new(),
                }
            }
            Phase::Single {
                id: first,
                last,
                role,
            } if first != id => {
                self.phase = Phase::Pinch {
                    a: (first, last),
                    b: (id, pos),
                };
                match role {
                    SingleRole::Tool => vec![GestureAction::ToolCancel],
                    SingleRole::Pan => Vec::new(),
                }
            }
            Phase::Draining { id: held, last } if held != id => {
                self.phase = Phase::Pinch {
                    a: (held, last),
                    b: (id, pos),
                };
                Vec::new()
            }
            // Repeated down for a tracked contact, or a third finger
            _ => Vec::new(),
        }
    }

    fn on_move(&mut self, id: ContactId, pos: Pos2) -> Vec<GestureAction> {
        match &mut self.phase {
            Phase::Single {
                id: tracked,
                last,
                role,
            } if *tracked == id => {
                let delta = pos - *last;
                *last = pos;
                match role {
                    SingleRole::Tool => vec![GestureAction::ToolDrag(pos)],
                    SingleRole::Pan if delta != Vec2::ZERO => vec![GestureAction::Pan(delta)],
                    SingleRole::Pan => Vec::new(),
                }
            }
            Phase::Pinch { a, b } if a.0 == id || b.0 == id => {
                let (old_mid, old_dist) = pinch_geometry(a.1, b.1);
                if a.0 == id {
                    a.1 = pos;
                } else {
                    b.1 = pos;
                }
                let (new_mid, new_dist) = pinch_geometry(a.1, b.1);

                // Similarity mapping old_mid -> new_mid scaled by the
                // distance ratio: zoom about old_mid, then pan by the shift.
                let mut actions = Vec::with_capacity(2);
                if old_dist >= MIN_PINCH_DISTANCE && new_dist >= MIN_PINCH_DISTANCE {
                    let factor = new_dist / old_dist;
                    if factor != 1.0 {
                        actions.push(GestureAction::Zoom {
                            factor,
                            focal: old_mid,
                        });
                    }
                }
                let shift = new_mid - old_mid;
                if shift != Vec2::ZERO {
                    actions.push(GestureAction::Pan(shift));
                }
                actions
            }
            Phase::Draining { id: held, last } if *held == id => {
                *last = pos;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_up(&mut self, id: ContactId, pos: Pos2) -> Vec<GestureAction> {
        match self.phase {
            Phase::Single {
                id: tracked, role, ..
            } if tracked == id => {
                self.phase = Phase::Idle;
                match role {
                    SingleRole::Tool => vec![GestureAction::ToolRelease(pos)],
                    SingleRole::Pan => Vec::new(),
                }
            }
            Phase::Pinch { a, b } if a.0 == id || b.0 == id => {
                let remaining = if a.0 == id { b } else { a };
                self.phase = Phase::Draining {
                    id: remaining.0,
                    last: remaining.1,
                };
                Vec::new()
            }
            Phase::Draining { id: held, .. } if held == id => {
                self.phase = Phase::Idle;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_cancel(&mut self, id: ContactId) -> Vec<GestureAction> {
        match self.phase {
            Phase::Single {
                id: tracked, role, ..
            } if tracked == id => {
                self.phase = Phase::Idle;
                match role {
                    SingleRole::Tool => vec![GestureAction::ToolCancel],
                    SingleRole::Pan => Vec::new(),
                }
            }
            // A cancelled pinch contact behaves like a lifted one
            Phase::Pinch { a, b } if a.0 == id || b.0 == id => {
                let pos = if a.0 == id { a.1 } else { b.1 };
                self.on_up(id, pos)
            }
            Phase::Draining { id: held, .. } if held == id => {
                self.phase = Phase::Idle;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

fn pinch_geometry(a: Pos2, b: Pos2) -> (Pos2, f32) {
    (a + (b - a) * 0.5, a.distance(b))
}

// ============================================================================
// EGUI ADAPTER
// ============================================================================

/// Turns raw `egui::Event`s into [`InputEvent`]s relative to the canvas
/// view's top-left corner.
#[derive(Debug, Default)]
pub struct EguiInputAdapter {
    origin: Pos2,
    touches: HashSet<u64>,
    mouse_down: bool,
    hover: Option<Pos2>,
}

impl EguiInputAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Screen position of the canvas view's top-left corner.
    pub fn set_origin(&mut self, origin: Pos2) {
        self.origin = origin;
    }

    pub fn touches_active(&self) -> bool {
        !self.touches.is_empty()
    }

    fn local(&self, pos: Pos2) -> Pos2 {
        pos - self.origin.to_vec2()
    }

    pub fn translate(&mut self, event: &egui::Event) -> Option<InputEvent> {
        match event {
            egui::Event::Touch { id, phase, pos, .. } => {
                let contact = ContactId::Touch(id.0);
                let local = self.local(*pos);
                match phase {
                    egui::TouchPhase::Start => {
                        self.touches.insert(id.0);
                        Some(InputEvent::Down { id: contact, pos: local })
                    }
                    egui::TouchPhase::Move => Some(InputEvent::Move { id: contact, pos: local }),
                    egui::TouchPhase::End => {
                        self.touches.remove(&id.0);
                        Some(InputEvent::Up { id: contact, pos: local })
                    }
                    egui::TouchPhase::Cancel => {
                        self.touches.remove(&id.0);
                        Some(InputEvent::Cancel { id: contact })
                    }
                }
            }
            // egui synthesises pointer events from the first touch
            egui::Event::PointerButton { .. } | egui::Event::PointerMoved(_)
                if self.touches_active() =>
            {
                None
            }
            egui::Event::PointerButton {
                pos,
                button: egui::PointerButton::Primary,
                pressed,
                ..
            } => {
                let local = self.local(*pos);
                self.hover = Some(local);
                match (*pressed, self.mouse_down) {
                    (true, false) => {
                        self.mouse_down = true;
                        Some(InputEvent::Down {
                            id: ContactId::Mouse,
                            pos: local,
                        })
                    }
                    (false, true) => {
                        self.mouse_down = false;
                        Some(InputEvent::Up {
                            id: ContactId::Mouse,
                            pos: local,
                        })
                    }
                    _ => None,
                }
            }
            egui::Event::PointerMoved(pos) => {
                let local = self.local(*pos);
                self.hover = Some(local);
                self.mouse_down.then_some(InputEvent::Move {
                    id: ContactId::Mouse,
                    pos: local,
                })
            }
            egui::Event::PointerGone => {
                self.hover = None;
                None
            }
            egui::Event::Scroll(delta) if delta.y != 0.0 => Some(InputEvent::Wheel {
                pos: self.hover.unwrap_or(Pos2::ZERO),
                delta: delta.y,
            }),
            egui::Event::Zoom(factor) => Some(InputEvent::Magnify {
                factor: *factor,
                pos: self.hover.unwrap_or(Pos2::ZERO),
            }),
            _ => None,
        }
    }
}
