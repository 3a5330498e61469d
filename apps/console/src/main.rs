//! Headless walkthrough of the metric grid controller against the in-memory
//! store: prints the column policy, loads pages, applies edits and drives the
//! pending change set from the terminal.

use std::{collections::HashMap, fs, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use grid_core::{columns, CellValue, Field, GridController, RouteData};
use shared::{
    domain::{CostObjectId, MetricId, ScenarioId, ScopeKind, SessionId, TimePeriodId},
    protocol::{CostObjectSummary, Metric, ScenarioSummary, SessionSummary},
};
use store::{GridStore, StoreSeed};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
struct Cli {
    /// Which partition of the catalog the view operates on.
    #[arg(long, value_enum, default_value = "partitioned")]
    scope: ScopeArg,
    /// Seed the active scenario as locked.
    #[arg(long)]
    read_only: bool,
    /// Overrides the page size from console.toml / APP__PAGE_SIZE.
    #[arg(long)]
    page_size: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Partitioned,
    Global,
}

impl From<ScopeArg> for ScopeKind {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Partitioned => Self::Partitioned,
            ScopeArg::Global => Self::Global,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the column policy for the selected mode flags.
    Columns,
    /// Load one page and print it with formatters applied.
    Page {
        #[arg(long)]
        json: bool,
    },
    /// Edit a cell, commit, then create and discard a row.
    Walkthrough,
}

#[derive(Debug)]
struct Settings {
    page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self { page_size: 25 }
    }
}

fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("console.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(value) = file_cfg.get("page_size") {
                if let Ok(parsed) = value.parse() {
                    settings.page_size = parsed;
                }
            }
        }
    }

    if let Ok(value) = std::env::var("APP__PAGE_SIZE") {
        if let Ok(parsed) = value.parse() {
            settings.page_size = parsed;
        }
    }

    settings
}

fn demo_seed(read_only: bool, page_size: usize) -> StoreSeed {
    StoreSeed {
        metrics: vec![
            Metric {
                metric_id: MetricId(1),
                name: "Revenue".into(),
                data_type: "Currency".into(),
                size: 12,
                description: "Gross revenue".into(),
                column_name: "REVENUE".into(),
                cost_object_id: Some(CostObjectId(7)),
            },
            Metric {
                metric_id: MetricId(2),
                name: "Headcount".into(),
                data_type: "Integer".into(),
                size: 4,
                description: "Active employees".into(),
                column_name: "HEADCOUNT".into(),
                cost_object_id: Some(CostObjectId(8)),
            },
            Metric {
                metric_id: MetricId(3),
                name: "FxRate".into(),
                data_type: "Decimal".into(),
                size: 8,
                description: "Month-end FX rate".into(),
                column_name: "FX_RATE".into(),
                cost_object_id: Some(CostObjectId(100)),
            },
        ],
        cost_objects: vec![
            CostObjectSummary {
                cost_object_id: CostObjectId(7),
                name: "Marketing".into(),
                is_global: false,
            },
            CostObjectSummary {
                cost_object_id: CostObjectId(8),
                name: "Operations".into(),
                is_global: false,
            },
            CostObjectSummary {
                cost_object_id: CostObjectId(100),
                name: "Corporate".into(),
                is_global: true,
            },
        ],
        scenario: ScenarioSummary {
            scenario_id: ScenarioId(11),
            name: "FY26 Draft".into(),
            read_only,
            time_period_id: TimePeriodId(4),
        },
        can_modify: true,
        sessions: vec![SessionSummary {
            session_id: SessionId(1),
            time_period_id: TimePeriodId(4),
            username: "avery".into(),
            started_at: "2026-02-01T09:00:00Z".parse().expect("seed timestamp"),
        }],
        page_size,
    }
}

type PageReceiver = mpsc::UnboundedReceiver<(Vec<Metric>, u64)>;

async fn next_page(pages: &mut PageReceiver) -> Result<(Vec<Metric>, u64)> {
    tokio::time::timeout(Duration::from_secs(2), pages.recv())
        .await
        .context("timed out waiting for a page")?
        .context("datasource closed")
}

/// The combined callback fires on every source emission, so transitional
/// pages are expected; wait for the one that shows the change we made.
async fn page_matching<F>(pages: &mut PageReceiver, mut matches: F) -> Result<(Vec<Metric>, u64)>
where
    F: FnMut(&[Metric], u64) -> bool,
{
    loop {
        let (rows, total_count) = next_page(pages).await?;
        if matches(&rows, total_count) {
            return Ok((rows, total_count));
        }
    }
}

fn print_page(controller: &GridController, rows: &[Metric], total_count: u64) {
    let cache = controller.reference_cache();
    let column_set = controller.columns();

    let headers: Vec<&str> = column_set
        .iter()
        .skip(1)
        .map(|column| column.header)
        .collect();
    println!("{}", headers.join(" | "));
    for row in rows {
        let cells: Vec<String> = column_set
            .iter()
            .skip(1)
            .map(|column| columns::render_cell(column, row, &cache).unwrap_or_default())
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!("({} of {total_count} rows)", rows.len());
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let settings = load_settings();
    let page_size = cli.page_size.unwrap_or(settings.page_size);
    let scope = ScopeKind::from(cli.scope);

    let store = GridStore::launch(demo_seed(cli.read_only, page_size));
    let title = if scope.is_global() {
        "Global Metrics"
    } else {
        "Metrics"
    };
    let controller = GridController::new(
        Arc::new(store.clone()),
        RouteData {
            scope,
            title: title.into(),
        },
    );
    store.announce_context();

    match cli.command {
        Command::Columns => {
            println!("{}:", controller.title());
            for column in controller.columns() {
                println!(
                    "  {:<20} field={:<20} editable={}",
                    if column.header.is_empty() {
                        "(selection)"
                    } else {
                        column.header
                    },
                    column.field.entity_key().unwrap_or("-"),
                    column.editable
                );
            }
        }
        Command::Page { json } => {
            let (pages_tx, mut pages) = mpsc::unbounded_channel();
            controller.row_source().get_rows(move |rows, total_count| {
                let _ = pages_tx.send((rows, total_count));
            });
            let (rows, total_count) = next_page(&mut pages).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}:", controller.title());
                print_page(&controller, &rows, total_count);
            }
        }
        Command::Walkthrough => {
            let (pages_tx, mut pages) = mpsc::unbounded_channel();
            controller.row_source().get_rows(move |rows, total_count| {
                let _ = pages_tx.send((rows, total_count));
            });

            let (rows, initial_total) = next_page(&mut pages).await?;
            println!("== {} ==", controller.title());
            print_page(&controller, &rows, initial_total);

            let Some(first) = rows.first() else {
                println!("no rows in this partition; nothing to edit");
                return Ok(());
            };

            println!("\nediting '{}' description...", first.name);
            let capture = controller.edit_capture();
            capture.on_cell_value_changed(
                Field::Description,
                &CellValue::Text(first.description.clone()),
                &CellValue::Text(format!("{} (reviewed)", first.description)),
                first,
            );
            let (rows, total_count) = page_matching(&mut pages, |rows, _| {
                rows.iter()
                    .any(|metric| metric.description.ends_with("(reviewed)"))
            })
            .await?;
            print_page(&controller, &rows, total_count);
            println!(
                "change buttons disabled: {}",
                controller.change_buttons_disabled()
            );

            let changes = controller.change_set();
            if controller.cannot_modify() {
                println!("\nscenario is locked; skipping commit");
            } else {
                println!("\ncommitting pending changes...");
                changes.commit();
                for _ in 0..100 {
                    if controller.change_buttons_disabled() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                println!("pending changes drained; buttons disabled again");
            }

            println!("\ncreating a row, then discarding it...");
            changes.create_new();
            let (rows, total_count) =
                page_matching(&mut pages, |_, total_count| total_count == initial_total + 1)
                    .await?;
            print_page(&controller, &rows, total_count);

            while pages.try_recv().is_ok() {}
            changes.discard();
            let (rows, total_count) =
                page_matching(&mut pages, |_, total_count| total_count == initial_total).await?;
            print_page(&controller, &rows, total_count);
        }
    }

    Ok(())
}
