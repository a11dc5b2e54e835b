//! Plays an eleven-turn story against a scripted completion service.
//!
//! Run with: `RUST_LOG=story_core=debug cargo run -p story-core --example scripted_session`

use std::sync::Arc;

use story_core::testing::{ScriptedCompletion, ScriptedReply};
use story_core::{
    handle_turn, Mood, NarrativeSegment, SessionRegistry, StoryConfig, TurnBody, TurnRequest,
};

const TURNS: usize = 11;

fn scripted_turn(turn: usize) -> ScriptedReply {
    let mood = Mood::ALL[turn % Mood::ALL.len()];
    let segment = NarrativeSegment::new(
        format!("Passage {turn}. The tunnel narrows and the air turns {mood}."),
        vec![
            format!("Press on into passage {}", turn + 1),
            "Rest by the wall".to_string(),
        ],
        mood,
    )
    .with_image_prompt(format!("narrow stone tunnel, {mood} atmosphere"));

    // Every third reply arrives fenced, the way chat models often answer.
    if turn % 3 == 0 {
        ScriptedReply::fenced(&segment)
    } else {
        ScriptedReply::Segment(segment)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let completion = Arc::new(ScriptedCompletion::new(
        (1..=TURNS).map(scripted_turn).collect(),
    ));
    let registry = SessionRegistry::new(completion.clone(), StoryConfig::default());
    let id = registry.create().await;
    println!("=== Session {id} ===\n");

    let mut request = TurnRequest::default();
    for turn in 1..=TURNS {
        let reply = handle_turn(&registry, id, request.clone()).await;
        let segment = match reply.body {
            TurnBody::Segment(segment) => segment,
            TurnBody::Error(body) => {
                let message = format!("turn {turn} failed ({}): {}", reply.status, body.details);
                return Err(message.into());
            }
        };

        let act = registry.snapshot(id).await?.current_act();
        println!("--- Turn {turn} (act {act}, {}) ---", segment.mood);
        println!("{}", segment.narrative_text);
        for (n, choice) in segment.choices.iter().enumerate() {
            println!("  {}. {choice}", n + 1);
        }
        println!();

        request = TurnRequest {
            last_choice: segment.choices.first().cloned(),
        };
    }

    let state = registry.snapshot(id).await?;
    println!("=== Final world state ===");
    println!("{}", serde_json::to_string_pretty(state.world())?);
    println!("\nPrompts sent: {}", completion.calls().len());
    Ok(())
}
