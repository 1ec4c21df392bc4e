//! # Wellness Telegram Bot
//!
//! A Telegram bot that collects a daily wellness report (weight, steps,
//! sleep, calories, training, mood, comments) through a scripted dialogue,
//! keeps nutrition totals consistent with the logged meals, imports meals
//! from a nutrition diary and asks an AI service for feedback on each day.

pub mod analysis;
pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod conversation;
pub mod db;
pub mod diary;
pub mod errors;
pub mod image_input;
pub mod keywords;
pub mod localization;
pub mod nutrition;
pub mod report_model;
pub mod report_parser;
pub mod storage;
