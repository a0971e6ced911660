use std::{
    io::{self, Write},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use client_core::{
    parse_transcript, AssistantAdvisor, ClientEvent, MarketClient, OrderSide, SearchFilter,
    VoiceCommand, RECOMMENDATION_MARKER,
};
use shared::{
    domain::{OrderId, OrderStatus, ProductId, RoomId, UserId, UserRole},
    protocol::OrderDraft,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Festiloc command line client")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[arg(long)]
    username: String,
    /// Session role: client, provider, organizer or admin.
    #[arg(long, default_value = "client")]
    role: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the catalog.
    Search {
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one product with its images.
    Product { product_id: i64 },
    /// Toggle a product in the favorites list.
    Favorite { product_id: i64 },
    /// List favorite products.
    Favorites,
    #[command(subcommand)]
    Order(OrderCommand),
    #[command(subcommand)]
    Chat(ChatCommand),
    /// Send a notification to another user.
    Notify {
        recipient: i64,
        kind: String,
        title: String,
        body: String,
    },
    /// Map a French transcript to a UI command (local, no session).
    Voice { transcript: String },
    /// Ask the shopping assistant; streams the reply.
    Ask { question: String },
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
    /// Place an order with a provider.
    Place {
        provider_id: i64,
        total_cents: i64,
        deposit_cents: i64,
        /// Event date, YYYY-MM-DD.
        event_date: NaiveDate,
        location: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List orders for one side of the marketplace.
    List {
        #[arg(long, default_value = "client")]
        side: String,
    },
    /// Move an order forward (provider only).
    Advance { order_id: i64, target: String },
    /// Cancel a pending order; requires --yes to confirm.
    Cancel {
        order_id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ChatCommand {
    /// Open (or reopen) a room with a provider.
    Open { provider_id: i64, label: String },
    /// Send a text message to a room.
    Send { room_id: i64, text: String },
    /// Print realtime inserts for a room until Ctrl-C.
    Watch { room_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    if let Command::Voice { transcript } = &cli.command {
        print_voice_command(transcript);
        return Ok(());
    }

    let client = MarketClient::new(cli.server_url.clone());
    let role = parse_role(&cli.role)?;
    let session = client.sign_in(&cli.username, role).await?;
    info!(user_id = session.user_id.0, "session opened");

    match cli.command {
        Command::Search {
            query,
            category,
            limit,
        } => {
            let products = client
                .search_products(SearchFilter {
                    query,
                    category,
                    limit,
                    before: None,
                })
                .await?;
            if products.is_empty() {
                println!("Aucun résultat.");
            }
            for product in products {
                println!(
                    "#{} {} | {} | {} FCFA | {}",
                    product.product_id.0,
                    product.name,
                    product.category,
                    product.price_cents / 100,
                    product.city
                );
            }
        }
        Command::Product { product_id } => {
            let detail = client.product_detail(ProductId(product_id)).await?;
            println!("#{} {}", detail.product_id.0, detail.name);
            println!(
                "Catégorie : {} | Ville : {} | Prix : {} FCFA",
                detail.category,
                detail.city,
                detail.price_cents / 100
            );
            if !detail.description.is_empty() {
                println!("{}", detail.description);
            }
            for image in &detail.images {
                println!("image : {image}");
            }
        }
        Command::Favorite { product_id } => {
            let favorited = client.toggle_favorite(ProductId(product_id)).await?;
            if favorited {
                println!("Ajouté aux favoris.");
            } else {
                println!("Retiré des favoris.");
            }
        }
        Command::Favorites => {
            let products = client.favorites().await?;
            if products.is_empty() {
                println!("Aucun favori.");
            }
            for product in products {
                println!(
                    "#{} {} | {} FCFA | {}",
                    product.product_id.0,
                    product.name,
                    product.price_cents / 100,
                    product.city
                );
            }
        }
        Command::Order(order_command) => run_order_command(&client, order_command).await?,
        Command::Chat(chat_command) => run_chat_command(&client, chat_command).await?,
        Command::Notify {
            recipient,
            kind,
            title,
            body,
        } => {
            let notification = client.notify(UserId(recipient), &kind, &title, &body).await?;
            println!("Notification n°{} envoyée.", notification.notification_id.0);
        }
        // Handled before sign-in.
        Command::Voice { .. } => {}
        Command::Ask { question } => run_ask(&client, question).await?,
    }

    Ok(())
}

async fn run_order_command(client: &Arc<MarketClient>, command: OrderCommand) -> Result<()> {
    match command {
        OrderCommand::Place {
            provider_id,
            total_cents,
            deposit_cents,
            event_date,
            location,
            notes,
        } => {
            let order = client
                .place_order(OrderDraft {
                    provider_id: UserId(provider_id),
                    total_cents,
                    deposit_cents,
                    event_date,
                    location,
                    notes,
                })
                .await?;
            println!(
                "Commande n°{} créée : {}",
                order.order_id.0,
                order.status.label_fr()
            );
        }
        OrderCommand::List { side } => {
            let side = if side.eq_ignore_ascii_case("provider") {
                OrderSide::Provider
            } else {
                OrderSide::Client
            };
            let orders = client.orders(side).await?;
            if orders.is_empty() {
                println!("Aucune commande.");
            }
            for order in orders {
                println!(
                    "n°{} | {} | {} FCFA | {} | {}",
                    order.order_id.0,
                    order.event_date,
                    order.total_cents / 100,
                    order.location,
                    order.status.label_fr()
                );
            }
        }
        OrderCommand::Advance { order_id, target } => {
            let target = parse_status(&target)?;
            let order = client.order(OrderId(order_id)).await?;
            let controller = client.status_controller(order).await?;
            let line = controller.advance(target).await?;
            println!("{line}");
        }
        OrderCommand::Cancel { order_id, yes } => {
            if !yes {
                println!("Annulation non confirmée. Relancez avec --yes pour confirmer.");
                return Ok(());
            }
            let order = client.order(OrderId(order_id)).await?;
            let controller = client.status_controller(order).await?;
            let request = controller.request_cancellation();
            let line = request.confirm().await?;
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_chat_command(client: &Arc<MarketClient>, command: ChatCommand) -> Result<()> {
    match command {
        ChatCommand::Open { provider_id, label } => {
            let room = client.open_room(UserId(provider_id), &label).await?;
            println!("Salon n°{} ouvert : {}", room.room_id.0, room.label);
        }
        ChatCommand::Send { room_id, text } => {
            let message = client.send_message(RoomId(room_id), &text).await?;
            println!("Message n°{} envoyé.", message.message_id.0);
        }
        ChatCommand::Watch { room_id } => {
            let mut subscription = client.subscribe(RoomId(room_id)).await?;
            println!("Écoute du salon n°{room_id}. Ctrl-C pour quitter.");
            let shutdown = tokio::signal::ctrl_c();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    message = subscription.next_message() => {
                        let Some(message) = message else { break };
                        let sender = message
                            .sender_username
                            .unwrap_or_else(|| format!("n°{}", message.sender_id.0));
                        println!(
                            "[{}] {} : {}",
                            message.created_at.format("%H:%M:%S"),
                            sender,
                            message.body
                        );
                    }
                    _ = &mut shutdown => break,
                }
            }
        }
    }
    Ok(())
}

async fn run_ask(client: &Arc<MarketClient>, question: String) -> Result<()> {
    let advisor = AssistantAdvisor::from_env(Arc::clone(client))?;
    let products = client
        .search_products(SearchFilter {
            limit: Some(50),
            ..SearchFilter::default()
        })
        .await?;
    let context = AssistantAdvisor::catalog_context(&products);

    let mut events = client.subscribe_events();
    let mut ask_task = tokio::spawn(async move { advisor.ask(&question, &context).await });

    let mut streamed = String::new();
    let mut printed = 0;
    let reply = loop {
        tokio::select! {
            event = events.recv() => {
                if let Ok(ClientEvent::AssistantFragment { text }) = event {
                    streamed.push_str(&text);
                    printed = print_stream(&streamed, printed)?;
                }
            }
            result = &mut ask_task => break result??,
        }
    };
    // Fragments buffered between the last poll and task completion.
    loop {
        match events.try_recv() {
            Ok(ClientEvent::AssistantFragment { text }) => {
                streamed.push_str(&text);
                printed = print_stream(&streamed, printed)?;
            }
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    println!();

    if !reply.products.is_empty() {
        println!("\nRecommandations :");
        for product in reply.products {
            println!(
                "  #{} {} ({} FCFA)",
                product.product_id.0,
                product.name,
                product.price_cents / 100
            );
        }
    }
    Ok(())
}

/// Prints whatever streamed text past `printed` is safe to show. The trailing
/// recommendations marker is machine data, so a partial match at the end of
/// the buffer is held back until the next fragment settles it either way.
fn print_stream(streamed: &str, printed: usize) -> io::Result<usize> {
    let visible = match streamed.find(RECOMMENDATION_MARKER) {
        Some(idx) => idx,
        None => {
            let longest = RECOMMENDATION_MARKER.len().min(streamed.len());
            (1..=longest)
                .rev()
                .find(|take| streamed.ends_with(&RECOMMENDATION_MARKER[..*take]))
                .map_or(streamed.len(), |take| streamed.len() - take)
        }
    };
    if visible > printed {
        print!("{}", &streamed[printed..visible]);
        io::stdout().flush()?;
    }
    Ok(visible.max(printed))
}

fn print_voice_command(transcript: &str) {
    match parse_transcript(transcript) {
        VoiceCommand::Search { query } => println!("recherche : {query}"),
        VoiceCommand::Navigate { target } => println!("navigation : {target}"),
        VoiceCommand::Help => println!("aide"),
        VoiceCommand::Cancel => println!("annulation"),
        VoiceCommand::Raw { transcript } => println!("texte libre : {transcript}"),
    }
}

fn parse_role(value: &str) -> Result<UserRole> {
    match value.to_ascii_lowercase().as_str() {
        "client" => Ok(UserRole::Client),
        "provider" => Ok(UserRole::Provider),
        "organizer" => Ok(UserRole::Organizer),
        "admin" => Ok(UserRole::Admin),
        other => Err(anyhow!(
            "unknown role {other}; expected client, provider, organizer or admin"
        )),
    }
}

fn parse_status(value: &str) -> Result<OrderStatus> {
    match value.to_ascii_lowercase().as_str() {
        "confirmed" => Ok(OrderStatus::Confirmed),
        "in_progress" => Ok(OrderStatus::InProgress),
        "completed" => Ok(OrderStatus::Completed),
        "cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(anyhow!(
            "unknown status {other}; expected confirmed, in_progress, completed or cancelled"
        )),
    }
}
