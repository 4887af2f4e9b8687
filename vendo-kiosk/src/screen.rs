//! Line-oriented kiosk screen.
//!
//! Reads commands from stdin, renders the card session, balance and cart
//! to stdout, and hands confirmed orders over to a [`DispensingRun`].

use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vendo_core::balance::Balance;
use vendo_core::cart::Cart;
use vendo_core::checkout::{CheckoutAvailability, CheckoutOrchestrator, ConfirmedOrder};
use vendo_core::config::DispenseConfig;
use vendo_core::dispensing::DispenseSnapshot;
use vendo_core::events::{BalanceEvent, BalanceEventSender, RunSignal, run_signal_channel};
use vendo_core::processors::DispensingRun;
use vendo_core::session::{SessionState, SessionView};
use vendo_sdk::client::KioskClient;
use vendo_sdk::objects::Product;

use crate::backend::BackendOrders;

const HELP: &str = "\
commands:
  products          list the catalog
  add <product-id>  put one unit of a product in the cart
  inc <line>        one more unit of a cart line
  dec <line>        one less unit of a cart line
  rm <line>         remove a cart line
  cart              show the cart
  checkout          place the order with the inserted card
  help              this text
  quit              leave the kiosk";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Products,
    Add(i64),
    Increase(usize),
    Decrease(usize),
    Remove(usize),
    Cart,
    Checkout,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Cart lines are numbered from 1 on screen.
    fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };
        let arg = words.next();
        let line_index = |arg: Option<&str>| -> Result<usize, String> {
            match arg.map(str::parse::<usize>) {
                Some(Ok(n)) if n > 0 => Ok(n - 1),
                _ => Err(format!("usage: {verb} <line>")),
            }
        };
        match verb {
            "products" | "p" => Ok(Self::Products),
            "add" | "a" => arg
                .and_then(|id| id.parse().ok())
                .map(Self::Add)
                .ok_or_else(|| "usage: add <product-id>".to_string()),
            "inc" | "+" => line_index(arg).map(Self::Increase),
            "dec" | "-" => line_index(arg).map(Self::Decrease),
            "rm" => line_index(arg).map(Self::Remove),
            "cart" | "c" => Ok(Self::Cart),
            "checkout" => Ok(Self::Checkout),
            "help" | "?" => Ok(Self::Help),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command `{other}`, try `help`")),
        }
    }
}

pub struct KioskScreen {
    client: KioskClient,
    checkout: CheckoutOrchestrator<BackendOrders>,
    cart: Cart,
    catalog: Vec<Product>,
    session_rx: watch::Receiver<SessionView>,
    balance_rx: watch::Receiver<Balance>,
    balance_tx: BalanceEventSender,
    dispense_config: DispenseConfig,
}

impl KioskScreen {
    pub fn new(
        client: KioskClient,
        session_rx: watch::Receiver<SessionView>,
        balance_rx: watch::Receiver<Balance>,
        balance_tx: BalanceEventSender,
        dispense_config: DispenseConfig,
    ) -> Self {
        let checkout = CheckoutOrchestrator::new(BackendOrders::new(client.clone()));
        Self {
            client,
            checkout,
            cart: Cart::new(),
            catalog: Vec::new(),
            session_rx,
            balance_rx,
            balance_tx,
            dispense_config,
        }
    }

    /// Run until the user quits, stdin closes, or shutdown is signaled.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        info!("KioskScreen started");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        self.load_catalog().await;
        println!("{HELP}");
        self.render_status();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("KioskScreen received shutdown signal");
                        break;
                    }
                }

                changed = self.session_rx.changed() => {
                    if changed.is_err() {
                        warn!("Session driver stopped");
                        break;
                    }
                    self.render_status();
                }

                changed = self.balance_rx.changed() => {
                    if changed.is_err() {
                        warn!("Balance watcher stopped");
                        break;
                    }
                    self.render_status();
                }

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("stdin closed");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Command::parse(&line) {
                        Ok(Command::Quit) => break,
                        Ok(command) => self.execute(command, &shutdown_rx).await,
                        Err(usage) => println!("{usage}"),
                    }
                }
            }
        }

        info!("KioskScreen shutdown complete");
        Ok(())
    }

    async fn execute(&mut self, command: Command, shutdown_rx: &watch::Receiver<bool>) {
        match command {
            Command::Products => {
                self.load_catalog().await;
                self.render_catalog();
            }
            Command::Add(product_id) => {
                let Some(product) = self.catalog.iter().find(|p| p.id == product_id) else {
                    println!("no product with id {product_id}");
                    return;
                };
                match self.cart.add_product(product) {
                    Ok(()) => self.render_cart(),
                    Err(e) => println!("{e}"),
                }
            }
            Command::Increase(index) => {
                if let Err(e) = self.cart.increase(index) {
                    println!("{e}");
                }
                self.render_cart();
            }
            Command::Decrease(index) => {
                if let Err(e) = self.cart.decrease(index) {
                    println!("{e}");
                }
                self.render_cart();
            }
            Command::Remove(index) => {
                if let Err(e) = self.cart.remove(index) {
                    println!("{e}");
                }
                self.render_cart();
            }
            Command::Cart => self.render_cart(),
            Command::Checkout => self.place_order(shutdown_rx).await,
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    async fn load_catalog(&mut self) {
        match self.client.list_products().await {
            Ok(products) => {
                debug!(count = products.len(), "Catalog loaded");
                self.catalog = products;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load catalog");
                println!("Could not load products: {e}");
            }
        }
    }

    async fn place_order(&mut self, shutdown_rx: &watch::Receiver<bool>) {
        let session = self.session_rx.borrow().clone();
        let balance = self.balance_rx.borrow().clone();

        match self
            .checkout
            .attempt_checkout(&mut self.cart, &session, &balance)
            .await
        {
            Ok(order) => {
                println!("Order placed successfully!");
                if self.balance_tx.send(BalanceEvent::Refresh).await.is_err() {
                    warn!("Balance watcher gone, balance not refreshed");
                }
                self.dispense(order, shutdown_rx.clone()).await;
                self.load_catalog().await;
                self.render_status();
            }
            Err(e) => println!("{e}"),
        }
    }

    /// Show the dispensing screen until the run asks to leave.
    async fn dispense(&self, order: ConfirmedOrder, shutdown_rx: watch::Receiver<bool>) {
        let (run, mut snapshot_rx) = DispensingRun::new(&order.lines, self.dispense_config);
        let (signal_tx, mut signal_rx) = run_signal_channel();
        let handle = tokio::spawn(run.run(shutdown_rx, signal_tx));

        let mut snapshots_open = true;
        loop {
            tokio::select! {
                changed = snapshot_rx.changed(), if snapshots_open => {
                    if changed.is_err() {
                        snapshots_open = false;
                        continue;
                    }
                    render_dispensing(&snapshot_rx.borrow_and_update());
                }

                signal = signal_rx.recv() => match signal {
                    Some(RunSignal::Completed(outcome)) => {
                        println!(
                            "Dispensing complete: {} dispensed, {} failed",
                            outcome.completed, outcome.failed
                        );
                    }
                    Some(RunSignal::Leave) | None => break,
                },
            }
        }

        if let Err(e) = handle.await {
            warn!(error = %e, "Dispensing task failed");
        }
    }

    fn render_status(&self) {
        let session = self.session_rx.borrow().clone();
        let balance = self.balance_rx.borrow().clone();
        println!("[{}]", describe_session(&session, &balance));
        if let Some(error) = &session.display_error {
            println!("  ! {error}");
        }
        let button = CheckoutAvailability::evaluate(
            &self.cart,
            &session,
            &balance,
            self.checkout.is_submitting(),
        );
        let marker = if button.enabled() { "" } else { " (disabled)" };
        println!("  checkout: {}{marker}", button.label());
    }

    fn render_catalog(&self) {
        if self.catalog.is_empty() {
            println!("No products available");
            return;
        }
        for product in &self.catalog {
            let stock = if product.is_out_of_stock() {
                "out of stock".to_string()
            } else {
                format!("{} left", product.quantity)
            };
            println!(
                "  #{:<4} {:<24} {:>8}  {stock}",
                product.id,
                product.name,
                money(product.price)
            );
        }
    }

    fn render_cart(&self) {
        if self.cart.is_empty() {
            println!("Cart is empty");
            return;
        }
        for (n, line) in self.cart.lines().iter().enumerate() {
            let warning = if line.exceeds_stock() { "  exceeds stock!" } else { "" };
            println!(
                "  {:>2}. {:<24} x{:<3} {:>8}{warning}",
                n + 1,
                line.name,
                line.quantity,
                money(line.subtotal())
            );
        }
        println!(
            "  {} items, total {}",
            self.cart.total_quantity(),
            money(self.cart.total())
        );
    }
}

fn describe_session(session: &SessionView, balance: &Balance) -> String {
    match &session.state {
        SessionState::Connecting => "Connecting to card reader...".to_string(),
        SessionState::AwaitingCard => "Please insert your card".to_string(),
        SessionState::TransportError(e) => format!("Card reader error: {e}"),
        SessionState::CardPresent(card) | SessionState::PendingRemoval { last: card, .. } => {
            let amount = if balance.checking {
                "checking...".to_string()
            } else {
                match (balance.amount_for(&card.identity()), &balance.error) {
                    (Some(amount), _) => money(amount),
                    (None, Some(e)) => e.clone(),
                    (None, None) => "unknown".to_string(),
                }
            };
            format!("{}: balance {amount}", card.user_name)
        }
    }
}

fn render_dispensing(snapshot: &DispenseSnapshot) {
    for product in &snapshot.products {
        println!("  {} x{}: {}", product.name, product.quantity, product.status);
    }
}

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vendo_sdk::objects::{CardIdentity, CardSnapshot};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("products"), Ok(Command::Products));
        assert_eq!(Command::parse("add 42"), Ok(Command::Add(42)));
        assert_eq!(Command::parse("  inc 1 "), Ok(Command::Increase(0)));
        assert_eq!(Command::parse("dec 3"), Ok(Command::Decrease(2)));
        assert_eq!(Command::parse("rm 2"), Ok(Command::Remove(1)));
        assert_eq!(Command::parse("q"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(Command::parse("add").is_err());
        assert!(Command::parse("add cola").is_err());
        assert!(Command::parse("inc 0").is_err());
        assert!(Command::parse("rm").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn test_describe_session_balance() {
        let card = CardSnapshot {
            user_id: "u1".to_string(),
            user_name: "Ada".to_string(),
            credit: Decimal::ZERO,
        };
        let session = SessionView {
            state: SessionState::CardPresent(card),
            display_error: None,
        };
        let balance = Balance {
            amount: Some(Decimal::new(550, 2)),
            as_of: Some(CardIdentity("u1".to_string())),
            checking: false,
            error: None,
        };
        assert_eq!(describe_session(&session, &balance), "Ada: balance $5.50");

        let checking = Balance {
            checking: true,
            ..balance.clone()
        };
        assert_eq!(describe_session(&session, &checking), "Ada: balance checking...");

        let other_card = Balance {
            as_of: Some(CardIdentity("u2".to_string())),
            ..balance
        };
        assert_eq!(describe_session(&session, &other_card), "Ada: balance unknown");
    }
}
