//! Checkout item commands.

use clap::Args;

use voxelfox_core::PaymentUserId;
use voxelfox_website::db::CheckoutItemRepository;
use voxelfox_website::models::{CheckoutItem, NewCheckoutItem};

use super::{CommandError, connect};

/// Arguments for `item create`.
#[derive(Debug, Args)]
pub struct ItemArgs {
    /// Product name; an existing item with this name is replaced
    #[arg(short, long)]
    pub name: String,

    /// Payment user ID of the seller
    #[arg(short, long)]
    pub creator: PaymentUserId,

    /// Stripe product ID
    #[arg(long)]
    pub stripe_product: String,

    /// Stripe price ID
    #[arg(long)]
    pub stripe_price: String,

    /// Portal group the item is shown in
    #[arg(short, long)]
    pub group: Option<String>,

    /// Whether the item is a recurring subscription
    #[arg(long)]
    pub subscription: bool,

    /// URL of the bot's notification webhook
    #[arg(long, requires = "webhook_auth")]
    pub webhook: Option<String>,

    /// Authorization header sent with notifications
    #[arg(long)]
    pub webhook_auth: Option<String>,

    /// PayPal billing plan ID
    #[arg(long)]
    pub paypal_plan: Option<String>,

    /// Where buyers land after paying
    #[arg(long, default_value = "https://voxelfox.co.uk/")]
    pub success_url: String,

    /// Where buyers land after abandoning checkout
    #[arg(long, default_value = "https://voxelfox.co.uk/")]
    pub cancel_url: String,
}

impl From<ItemArgs> for NewCheckoutItem {
    fn from(args: ItemArgs) -> Self {
        Self {
            creator_id: args.creator,
            product_name: args.name,
            success_url: args.success_url,
            cancel_url: args.cancel_url,
            subscription: args.subscription,
            stripe_product_id: args.stripe_product,
            stripe_price_id: args.stripe_price,
            paypal_plan_id: args.paypal_plan.filter(|p| !p.is_empty()),
            transaction_webhook: args.webhook.filter(|w| !w.is_empty()),
            transaction_webhook_authorization: args.webhook_auth.unwrap_or_default(),
            product_group: args.group,
        }
    }
}

/// Create or replace a checkout item.
///
/// # Errors
///
/// Returns error if the database can't be reached or the insert fails.
pub async fn create(args: ItemArgs) -> Result<(), CommandError> {
    let pool = connect().await?;
    let item = CheckoutItemRepository::new(&pool)
        .upsert_by_name(&args.into())
        .await?;

    tracing::info!(item_id = %item.id, "Checkout item saved");
    #[allow(clippy::print_stdout)]
    {
        println!("{}", describe(&item));
    }
    Ok(())
}

/// List every checkout item.
///
/// # Errors
///
/// Returns error if the database can't be reached.
pub async fn list() -> Result<(), CommandError> {
    let pool = connect().await?;
    let items = CheckoutItemRepository::new(&pool).list_all().await?;

    #[allow(clippy::print_stdout)]
    {
        if items.is_empty() {
            println!("No checkout items");
        }
        for item in &items {
            println!("{}", describe(item));
        }
    }
    Ok(())
}

/// One line per item: ID, name, group, and how it's sold.
fn describe(item: &CheckoutItem) -> String {
    let kind = if item.subscription {
        "subscription"
    } else {
        "one-off"
    };
    format!(
        "{}  {}  [{}]  {}  {}",
        item.id,
        item.product_name,
        item.product_group.as_deref().unwrap_or("-"),
        kind,
        item.stripe_price_id,
    )
}
