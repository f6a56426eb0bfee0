// src/lib.rs
//
// Isometric Game of Life with color genetics and an audio-reactive mode.
//
// Data flow:
//   sim::Engine -> diff::DiffQueue -> anim::AnimGrid -> instances::InstanceBuilder
//   capture -> audio::SpectralAnalyzer -> visualizer::AudioVisualizer -> InstanceBuilder
//
// `scene::Scene` drives all of it once per rendered frame. Nothing in here
// needs a window, a GPU, or a sound card.

pub mod anim;
pub mod audio;
pub mod capture;
pub mod diff;
pub mod instances;
pub mod palette;
pub mod scene;
pub mod sim;
pub mod tuning;
pub mod visualizer;
