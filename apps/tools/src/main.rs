use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use shared::domain::{UserId, UserRole};
use storage::{OrderParty, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/festiloc.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateUser {
        username: String,
        #[arg(long, default_value = "client")]
        role: String,
    },
    CreateProduct {
        provider_id: i64,
        name: String,
        category: String,
        price_cents: i64,
        city: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Image object path; repeat the flag to add several.
        #[arg(long)]
        image: Vec<String>,
    },
    ListProducts {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    ListOrders {
        user_id: i64,
        #[arg(long, default_value = "client")]
        side: String,
    },
    /// Fill the database with demo accounts and listings.
    SeedDemo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateUser { username, role } => {
            let role = parse_role(&role)?;
            let (user_id, role) = storage.upsert_user(&username, role).await?;
            println!("user_id={} role={:?}", user_id.0, role);
        }
        Command::CreateProduct {
            provider_id,
            name,
            category,
            price_cents,
            city,
            description,
            image,
        } => {
            let product_id = storage
                .create_product(
                    UserId(provider_id),
                    &name,
                    &description,
                    &category,
                    price_cents,
                    &city,
                )
                .await?;
            for (position, path) in image.iter().enumerate() {
                storage
                    .add_product_image(product_id, path, position as i64)
                    .await?;
            }
            println!("product_id={}", product_id.0);
        }
        Command::ListProducts { limit } => {
            let products = storage.search_products(None, None, limit, None).await?;
            for (product, cover) in products {
                let mut line = format!(
                    "#{} {} | {} | {} FCFA | {}",
                    product.product_id.0,
                    product.name,
                    product.category,
                    product.price_cents / 100,
                    product.city
                );
                if let Some(cover) = cover {
                    line.push_str(&format!(" | cover={cover}"));
                }
                println!("{line}");
            }
        }
        Command::ListOrders { user_id, side } => {
            let party = if side.eq_ignore_ascii_case("provider") {
                OrderParty::Provider
            } else {
                OrderParty::Client
            };
            let orders = storage.list_orders_for(UserId(user_id), party).await?;
            for order in orders {
                println!(
                    "order_id={} status={:?} total_cents={} event_date={} location={}",
                    order.order_id.0,
                    order.status,
                    order.total_cents,
                    order.event_date,
                    order.location
                );
            }
        }
        Command::SeedDemo => seed_demo(&storage).await?,
    }

    Ok(())
}

async fn seed_demo(storage: &Storage) -> Result<()> {
    let (kone, _) = storage.upsert_user("kone-events", UserRole::Provider).await?;
    let (mariam, _) = storage
        .upsert_user("mariam-traiteur", UserRole::Provider)
        .await?;
    let (awa, _) = storage.upsert_user("awa", UserRole::Client).await?;
    println!(
        "users: kone-events={} mariam-traiteur={} awa={}",
        kone.0, mariam.0, awa.0
    );

    let listings = [
        (
            kone,
            "Tente de réception blanche",
            "Tente 10x20m pour 200 invités, montage et démontage inclus.",
            "tentes",
            80_000_00_i64,
            "Abidjan",
            Some("catalogue/tente-blanche.jpg"),
        ),
        (
            kone,
            "Lot de 100 chaises dorées",
            "Chaises médaillon dorées avec coussins blancs.",
            "mobilier",
            25_000_00,
            "Abidjan",
            None,
        ),
        (
            kone,
            "Sonorisation complète",
            "Enceintes, table de mixage et deux micros sans fil.",
            "sonorisation",
            60_000_00,
            "Bouaké",
            None,
        ),
        (
            mariam,
            "Buffet traiteur 50 invités",
            "Menu ivoirien complet, service et vaisselle compris.",
            "traiteur",
            150_000_00,
            "Abidjan",
            None,
        ),
        (
            mariam,
            "Fontaine à chocolat",
            "Fontaine trois étages avec fruits frais.",
            "traiteur",
            18_000_00,
            "Abidjan",
            None,
        ),
    ];
    for (provider, name, description, category, price_cents, city, cover) in listings {
        let product_id = storage
            .create_product(provider, name, description, category, price_cents, city)
            .await?;
        if let Some(cover) = cover {
            storage.add_product_image(product_id, cover, 0).await?;
        }
        println!("seeded product_id={} {name}", product_id.0);
    }
    Ok(())
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
