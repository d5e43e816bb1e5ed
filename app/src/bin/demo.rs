//! Booking engine demo
//!
//! Runs a short scenario against the configured store:
//! - A host creates a group event with a small capacity
//! - Attendees race to join, some bringing guests
//! - One attendee leaves, the host removes another
//! - The host tries to shrink the event below its occupancy, then resizes it
//!
//! # Usage
//!
//! ```bash
//! # In-memory store
//! cargo run --bin demo
//!
//! # PostgreSQL
//! STORE_BACKEND=postgres DATABASE_URL=postgres://localhost/attendance cargo run --bin demo
//! ```

use anyhow::Context;
use attendance_app::{App, Config, init_tracing};
use attendance_core::{BookingError, Caller, EventDraft, EventType, Guest};
use futures::future::join_all;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config.observability.log_filter);

    let app = App::new(&config).await.context("failed to start booking engine")?;
    let engine = app.engine.clone();

    let host = Caller::new("host-1", "Hana");
    let event = engine
        .create_event(
            &host,
            EventDraft::new("Sunday board games", 8).with_type(EventType::Group),
        )
        .await?;
    println!("Created '{}' with {} spots", event.title, event.capacity);

    let attendees: Vec<(Caller, Vec<Guest>)> = (1..=6)
        .map(|n| {
            let guests = (0..n % 3).map(|g| Guest::named(format!("Friend {n}.{g}"))).collect();
            (Caller::new(format!("user-{n}"), format!("Attendee {n}")), guests)
        })
        .collect();

    let joins = attendees.iter().map(|(caller, guests)| {
        let engine = engine.clone();
        let caller = caller.clone();
        let guests = guests.clone();
        tokio::spawn(async move {
            let result = engine.join_event(event.id, &caller, guests).await;
            (caller, result)
        })
    });
    for joined in join_all(joins).await {
        let (caller, result) = joined.context("join task panicked")?;
        match result {
            Ok(booking) => println!(
                "  {} booked {} spot(s)",
                caller.display_name, booking.total_spots
            ),
            Err(error) => println!("  {} was turned away: {error}", caller.display_name),
        }
    }

    let snapshot = engine.get_event(event.id).await?;
    println!(
        "Occupancy after the rush: {}/{}",
        snapshot.occupancy, snapshot.capacity
    );

    let bookings = engine.list_participants(event.id).await?;
    if let Some(first) = bookings.first() {
        let caller = Caller::anonymous(first.user_id.clone());
        let outcome = engine.leave_event(event.id, &caller).await?;
        println!("{} left, freeing {} spot(s)", first.user_id, outcome.spots_freed);
    }
    if let Some(second) = bookings.get(1) {
        let outcome = engine
            .remove_participant(event.id, &host, second.user_id.clone())
            .await?;
        println!(
            "Host removed {}, freeing {} spot(s)",
            second.user_id, outcome.spots_freed
        );
    }

    let current = engine.get_event(event.id).await?;
    match engine.update_event_capacity(event.id, &host, 1).await {
        Err(error @ BookingError::CapacityBelowOccupancy { .. }) => {
            println!("Shrinking to 1 refused: {error}");
        }
        other => println!("Unexpected resize outcome: {other:?}"),
    }
    let resized = engine
        .update_event_capacity(event.id, &host, current.occupancy.max(1) + 2)
        .await?;
    println!(
        "Resized to {} spots, {} remaining",
        resized.capacity,
        resized.remaining()
    );

    let removed = engine.delete_event(event.id, &host).await?;
    println!("Event deleted, {} booking(s) cancelled", removed.len());

    if let Some(metrics) = app.render_metrics() {
        println!("\n{metrics}");
    }

    drop(engine);
    app.shutdown().await;
    Ok(())
}
