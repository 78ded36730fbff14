//! FAQ Bot Example
//!
//! A console-driven demonstration of the Trellis framework: cascading
//! routes, a nested router, an exit point, free-text patterns and
//! expectations. Messages are read from stdin and replies printed to
//! stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package faq-bot
//! ```
//!
//! Try: `hi`, `shipping`, `returns`, `agent`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use trellis::prelude::*;
use trellis::runtime::logging::LoggingBuilder;
use trellis::runtime::{MemoryStateStorage, Processor};

/// Sender that prints message payloads to stdout.
struct ConsoleSender;

#[async_trait]
impl SenderHandle for ConsoleSender {
    fn send(&self, payload: Value) {
        if let Some(text) = payload["message"]["text"].as_str() {
            println!("bot> {text}");
        }
    }

    async fn flush(&self) -> SendReport {
        SendReport::default()
    }
}

struct ConsoleSenderFactory;

impl SenderFactory for ConsoleSenderFactory {
    fn create(&self, _event: &trellis::core::Event) -> Arc<dyn SenderHandle> {
        Arc::new(ConsoleSender)
    }
}

fn faq_router() -> Router {
    Router::new()
        .with(Route::new("/shipping").handler(|_req, res, _pb| async move {
            res.text("We ship worldwide within 3-5 business days.");
            Router::end()
        }))
        .with(Route::new("/returns").handler(|_req, res, _pb| async move {
            res.text("Returns are free for 30 days.");
            Router::end()
        }))
        .with(Route::any().handler(|req, _res, _pb| async move {
            let question = req.action_data()["question"]
                .as_str()
                .unwrap_or(req.text())
                .to_string();
            if question.contains("agent") {
                return Router::exit("escalate", json!({ "question": question }));
            }
            Router::brk()
        }))
}

fn build_router() -> Router {
    let mut router = Router::new();

    router.add(Route::new("/start").handler(|_req, res, _pb| async move {
        res.text("Hi! Ask me about shipping or returns.");
        Router::end()
    }));

    router.add(
        Route::new("/faq")
            .mount(faq_router())
            .on_exit("escalate", |data, _req, res, _pb| async move {
                let question = data["question"].as_str().unwrap_or("(unknown)");
                res.text(format!("Connecting you to a human about: {question}"));
                Router::end()
            }),
    );

    router.add(
        Route::pattern(Regex::new("ship").unwrap()).handler(|_req, res, pb| async move {
            res.text("Sounds like a shipping question!");
            pb.send("/faq/shipping", json!({}));
            Router::end()
        }),
    );

    router.add(
        Route::pattern(Regex::new("return").unwrap()).handler(|_req, _res, pb| async move {
            pb.send("/faq/returns", json!({}));
            Router::end()
        }),
    );

    router.add(Route::any().handler(|req, res, pb| async move {
        if req.text().contains("agent") {
            pb.send("/faq", json!({ "question": req.text() }));
            return Router::end();
        }
        res.text("I did not get that.");
        pb.send("/start", json!({}));
        Router::end()
    }));

    router
}

#[tokio::main]
async fn main() -> Result<()> {
    LoggingBuilder::new()
        .with_level(tracing::Level::INFO)
        .init();

    let router = build_router();
    router.on_action(|action, _text| info!(action, "Action observed"));

    let processor = Processor::new(
        router,
        Arc::new(MemoryStateStorage::new()),
        Arc::new(ConsoleSenderFactory),
    );

    println!("bot> Hi! Ask me about shipping or returns. (ctrl-d to quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        processor
            .process_message(trellis::core::Event::text("console-user", line))
            .await?;
    }
    Ok(())
}
