// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! A slice sampler for live performance: slices of a loaded recording play from the
//! number keys, a six-track drum kit runs under a step sequencer, and a one-shot loop
//! recorder replays what was played.
pub mod audio;
pub mod config;
pub mod controller;
pub mod drums;
pub mod engine;
pub mod export;
pub mod input;
pub mod looper;
pub mod playsync;
pub mod scheduler;
pub mod sequencer;
pub mod slices;
pub mod voice;

#[cfg(test)]
pub mod testutil;
