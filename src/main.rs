use std::{process, sync::Arc};

use leadcast::{
    application::{
        error::AppError,
        notify::TracingSink,
        pagination::{PageWindow, page_count},
        view::LiveView,
    },
    cache::{CacheConfig, CacheStore, FetchCoordinator, Resolved},
    config::{self, Command, QueryArgs, Settings, ViewSettings, WatchArgs},
    domain::{DomainError, LeadFilters, QueryParams},
    infra::{
        api::LeadsApiClient,
        live::{LiveChannel, LiveChannelConfig},
        telemetry,
    },
};
use leadcast_api_types::LeadRecord;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let command = cli_args
        .command
        .unwrap_or_else(|| Command::Watch(Box::<WatchArgs>::default()));

    match command {
        Command::List(args) => run_list(settings, &args.query).await,
        Command::Watch(args) => run_watch(settings, *args).await,
    }
}

async fn run_list(settings: Settings, query: &QueryArgs) -> Result<(), AppError> {
    let params = initial_params(&settings.view, query)?;
    let client = Arc::new(LeadsApiClient::new(&settings.api)?);
    let store = Arc::new(CacheStore::new(&CacheConfig::from(&settings.cache)));
    let coordinator = FetchCoordinator::new(store, client);

    let resolved = coordinator.resolve(params.clone(), false).await?;
    print_page(&params, &resolved);
    Ok(())
}

async fn run_watch(settings: Settings, args: WatchArgs) -> Result<(), AppError> {
    let params = initial_params(&settings.view, &args.query)?;
    let client = Arc::new(LeadsApiClient::new(&settings.api)?);
    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(CacheStore::new(&cache_config));
    let coordinator = FetchCoordinator::new(Arc::clone(&store), client);
    let view = LiveView::new(coordinator, params, cache_config.refetch);
    let mut invalidations = view.invalidations();

    let channel = LiveChannel::spawn(
        LiveChannelConfig::from(&settings),
        Arc::clone(&store),
        Arc::new(TracingSink),
    );
    info!(
        url = %settings.live.url,
        refetch = ?view.refetch_policy(),
        "Watching leads"
    );

    match view.resolve().await {
        Ok(resolved) => print_page(&view.params(), &resolved),
        Err(error) => warn!(error = %error, "Initial fetch failed; waiting for updates"),
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "Failed to listen for shutdown signal");
                }
                break;
            }
            update = view.next_update(&mut invalidations) => match update {
                Some(Ok(resolved)) => print_page(&view.params(), &resolved),
                Some(Err(error)) => warn!(error = %error, "Refetch failed; keeping last page"),
                None => break,
            },
        }
    }

    channel.close().await;
    Ok(())
}

fn initial_params(view: &ViewSettings, query: &QueryArgs) -> Result<QueryParams, DomainError> {
    let filters = LeadFilters {
        stage: query.stage.clone(),
        engaged: query.engaged,
        created_at_start: query
            .created_from
            .as_deref()
            .map(LeadFilters::parse_date)
            .transpose()?,
        created_at_end: query
            .created_to
            .as_deref()
            .map(LeadFilters::parse_date)
            .transpose()?,
    }
    .into_filters()?;

    let sort_field = query
        .sort_by
        .clone()
        .unwrap_or_else(|| view.sort_field.clone());
    let sort_order = query.order.unwrap_or(view.sort_order);

    Ok(
        QueryParams::new(query.limit.unwrap_or(view.page_size.get()))?
            .with_sort(sort_field, sort_order)
            .with_search(query.search.clone().unwrap_or_default())
            .with_filters(filters)
            .with_page(query.page.unwrap_or(1)),
    )
}

fn print_page(params: &QueryParams, resolved: &Resolved) {
    let page = &resolved.page;
    let pages = page_count(page.total_count, params.limit()).max(1);
    let marker = if resolved.is_revalidating() {
        " (refreshing)"
    } else {
        ""
    };

    println!(
        "{} · page {} of {pages}{marker}",
        PageWindow::new(params, page),
        params.page()
    );
    for lead in &page.items {
        println!("  {}", format_lead(lead));
    }
}

fn format_lead(lead: &LeadRecord) -> String {
    let mut line = lead.name.clone();
    if let Some(email) = lead.email.as_deref() {
        line.push_str(&format!(" <{email}>"));
    }
    for part in [lead.company.as_deref(), lead.stage.as_deref()]
        .into_iter()
        .flatten()
    {
        line.push_str(&format!(" · {part}"));
    }
    if lead.engaged {
        line.push_str(" · engaged");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadcast_api_types::WireId;

    fn lead(email: Option<&str>, company: Option<&str>, engaged: bool) -> LeadRecord {
        LeadRecord {
            id: WireId::new("1"),
            name: "Ada".to_string(),
            email: email.map(str::to_string),
            company: company.map(str::to_string),
            phone: None,
            stage: Some("New".to_string()),
            engaged,
            last_contacted: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn format_lead_joins_present_fields() {
        assert_eq!(
            format_lead(&lead(Some("ada@example.com"), Some("Acme"), true)),
            "Ada <ada@example.com> · Acme · New · engaged"
        );
        assert_eq!(format_lead(&lead(None, None, false)), "Ada · New");
    }
}
