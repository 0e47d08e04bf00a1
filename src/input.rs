// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pollable input state.
//!
//! The platform thread writes button transitions with their timestamps;
//! systems on the loop thread read a snapshot once per tick.
//!
//! # Examples
//!
//! ```
//! use std::time::{Duration, Instant};
//! use pooled_ecs::input::{InputState, KeyCode};
//!
//! let mut keys = InputState::new();
//! let t0 = Instant::now();
//! keys.press(KeyCode::Space, t0);
//! keys.release(KeyCode::Space, t0 + Duration::from_millis(40));
//! keys.press(KeyCode::Space, t0 + Duration::from_millis(120));
//!
//! assert!(keys.double_tapped(KeyCode::Space, Duration::from_millis(250)));
//! keys.end_frame(); // call once per tick after systems have read it
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default)]
struct ButtonRecord {
    down: bool,
    last_press: Option<Instant>,
    previous_press: Option<Instant>,
    last_release: Option<Instant>,
}

/// Down/up state per button plus press timestamps.
#[derive(Clone, Debug)]
pub struct InputState<T: Copy + Eq + Hash> {
    buttons: FxHashMap<T, ButtonRecord>,
    just_pressed: FxHashSet<T>,
    just_released: FxHashSet<T>,
}

impl<T: Copy + Eq + Hash> InputState<T> {
    pub fn new() -> Self {
        Self {
            buttons: FxHashMap::default(),
            just_pressed: FxHashSet::default(),
            just_released: FxHashSet::default(),
        }
    }

    /// Record a press at `at`. Repeats while already down are ignored.
    pub fn press(&mut self, button: T, at: Instant) {
        let record = self.buttons.entry(button).or_default();
        if record.down {
            return;
        }
        record.down = true;
        record.previous_press = record.last_press.replace(at);
        self.just_pressed.insert(button);
    }

    pub fn release(&mut self, button: T, at: Instant) {
        if let Some(record) = self.buttons.get_mut(&button) {
            if record.down {
                record.down = false;
                record.last_release = Some(at);
                self.just_released.insert(button);
            }
        }
    }

    /// Button is down right now
    pub fn pressed(&self, button: T) -> bool {
        self.buttons.get(&button).is_some_and(|r| r.down)
    }

    /// Down and was already down before this frame
    pub fn held(&self, button: T) -> bool {
        self.pressed(button) && !self.just_pressed.contains(&button)
    }

    pub fn just_pressed(&self, button: T) -> bool {
        self.just_pressed.contains(&button)
    }

    pub fn just_released(&self, button: T) -> bool {
        self.just_released.contains(&button)
    }

    /// The last two presses of `button` happened within `window`, and the
    /// second one landed this frame.
    pub fn double_tapped(&self, button: T, window: Duration) -> bool {
        if !self.just_pressed(button) {
            return false;
        }
        match self.buttons.get(&button) {
            Some(ButtonRecord {
                last_press: Some(last),
                previous_press: Some(previous),
                ..
            }) => last.saturating_duration_since(*previous) <= window,
            _ => false,
        }
    }

    pub fn last_press(&self, button: T) -> Option<Instant> {
        self.buttons.get(&button).and_then(|r| r.last_press)
    }

    pub fn last_release(&self, button: T) -> Option<Instant> {
        self.buttons.get(&button).and_then(|r| r.last_release)
    }

    /// Get all currently pressed inputs
    pub fn get_pressed(&self) -> impl Iterator<Item = T> + '_ {
        self.buttons
            .iter()
            .filter(|(_, record)| record.down)
            .map(|(button, _)| *button)
    }

    /// Forget this frame's transitions. Timestamps are kept.
    pub fn end_frame(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }

    pub fn reset(&mut self) {
        self.buttons.clear();
        self.end_frame();
    }
}

impl<T: Copy + Eq + Hash> Default for InputState<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyboard key codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[rustfmt::skip]
pub enum KeyCode {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Key0, Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Space, Enter, Escape, Tab, Backspace, Delete,
    Left, Right, Up, Down,
    LShift, RShift, LControl, RControl, LAlt, RAlt,
}

/// Mouse button codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Cursor position in window coordinates, with the motion since last frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cursor {
    pub x: f32,
    pub y: f32,
    pub delta_x: f32,
    pub delta_y: f32,
}

impl Cursor {
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.delta_x += x - self.x;
        self.delta_y += y - self.y;
        self.x = x;
        self.y = y;
    }
}

/// Everything the platform layer reports.
#[derive(Clone, Debug, Default)]
pub struct Input {
    pub keys: InputState<KeyCode>,
    pub mouse: InputState<MouseButton>,
    pub cursor: Cursor,
    /// Set when the host's message loop is shutting down
    pub quit_requested: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn end_frame(&mut self) {
        self.keys.end_frame();
        self.mouse.end_frame();
        self.cursor.delta_x = 0.0;
        self.cursor.delta_y = 0.0;
    }
}

/// Input shared between the platform thread and the loop thread.
pub type SharedInput = Arc<RwLock<Input>>;

pub fn shared_input() -> SharedInput {
    Arc::new(RwLock::new(Input::new()))
}

/// Copy the current state and close the frame, under one write lock.
pub fn take_frame(input: &SharedInput) -> Input {
    let mut guard = input.write();
    let snapshot = guard.clone();
    guard.end_frame();
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(t0: Instant, n: u64) -> Instant {
        t0 + Duration::from_millis(n)
    }

    #[test]
    fn test_press_release_cycle() {
        let t0 = Instant::now();
        let mut keys = InputState::new();

        keys.press(KeyCode::Space, t0);
        assert!(keys.pressed(KeyCode::Space));
        assert!(keys.just_pressed(KeyCode::Space));
        assert!(!keys.held(KeyCode::Space));

        keys.end_frame();
        assert!(keys.held(KeyCode::Space));
        assert!(!keys.just_pressed(KeyCode::Space));

        keys.release(KeyCode::Space, ms(t0, 10));
        assert!(!keys.pressed(KeyCode::Space));
        assert!(keys.just_released(KeyCode::Space));
        assert_eq!(keys.last_release(KeyCode::Space), Some(ms(t0, 10)));
    }

    #[test]
    fn test_repeat_press_does_not_restamp() {
        let t0 = Instant::now();
        let mut keys = InputState::new();
        keys.press(KeyCode::A, t0);
        keys.press(KeyCode::A, ms(t0, 5));
        assert_eq!(keys.last_press(KeyCode::A), Some(t0));
    }

    #[test]
    fn test_double_tap_window() {
        let t0 = Instant::now();
        let window = Duration::from_millis(200);
        let mut keys = InputState::new();

        keys.press(KeyCode::W, t0);
        assert!(!keys.double_tapped(KeyCode::W, window));
        keys.release(KeyCode::W, ms(t0, 30));
        keys.end_frame();

        keys.press(KeyCode::W, ms(t0, 150));
        assert!(keys.double_tapped(KeyCode::W, window));
        keys.release(KeyCode::W, ms(t0, 170));
        keys.end_frame();

        keys.press(KeyCode::W, ms(t0, 600));
        assert!(!keys.double_tapped(KeyCode::W, window));
    }

    #[test]
    fn test_take_frame_snapshot() {
        let input = shared_input();
        {
            let mut guard = input.write();
            guard.mouse.press(MouseButton::Left, Instant::now());
            guard.cursor.move_to(10.0, 4.0);
        }

        let frame = take_frame(&input);
        assert!(frame.mouse.just_pressed(MouseButton::Left));
        assert_eq!(frame.cursor.delta_x, 10.0);

        let next = take_frame(&input);
        assert!(!next.mouse.just_pressed(MouseButton::Left));
        assert!(next.mouse.pressed(MouseButton::Left));
        assert_eq!(next.cursor.delta_x, 0.0);
    }
}
