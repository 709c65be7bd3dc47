use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use ohub_adapters::parse_date;
use ohub_catalog::{CatalogConfig, CatalogService};
use ohub_core::{
    days_until_deadline, filter_opportunities, is_urgent, opportunities_on_date, resolve_status,
    sort_opportunities, Category, FilterCriteria, Level, Mode, Opportunity, SortKey, StatusFilter,
};
use ohub_storage::BookmarkStore;

mod telemetry;

#[derive(Debug, Parser)]
#[command(name = "ohub-cli")]
#[command(about = "Opportunity Hub command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Filter and sort the catalog.
    List(ListArgs),
    /// Show one opportunity.
    Show { id: String },
    /// Opportunities with a deadline or event date on DATE (YYYY-MM-DD).
    Calendar { date: NaiveDate },
    /// Toggle a bookmark.
    Bookmark { id: String },
    /// List bookmarked opportunities.
    Bookmarks,
    /// Run the JSON API server.
    Serve,
}

#[derive(Debug, Args, Default)]
struct ListArgs {
    /// Case-insensitive text matched against name, organizer, description and domains.
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    status: Option<StatusFilter>,
    #[arg(long, value_delimiter = ',')]
    category: Vec<Category>,
    #[arg(long, value_delimiter = ',')]
    mode: Vec<Mode>,
    #[arg(long, value_delimiter = ',')]
    level: Vec<Level>,
    #[arg(long = "domain", value_delimiter = ',')]
    domains: Vec<String>,
    /// Only India-focused entries.
    #[arg(long)]
    india: bool,
    /// Only entries with a stipend or prizes.
    #[arg(long)]
    stipend: bool,
    #[arg(long, default_value_t = SortKey::Deadline)]
    sort: SortKey,
    /// Evaluate statuses at this instant (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,
    /// YAML file with saved criteria; flags are added on top.
    #[arg(long)]
    criteria: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_date(raw).ok_or_else(|| format!("invalid instant '{raw}', expected YYYY-MM-DD or RFC 3339"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::List(ListArgs::default())) {
        Commands::List(args) => {
            let base = match &args.criteria {
                Some(path) => load_criteria(path)?,
                None => FilterCriteria::new(),
            };
            let criteria = apply_flags(base, &args);
            let now = args.now.unwrap_or_else(Utc::now);
            let catalog = load_catalog().await?;
            let listed = sort_opportunities(filter_opportunities(&catalog, &criteria, now), args.sort);

            if args.json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else {
                for o in &listed {
                    println!("{}", summary_line(o, now));
                }
                println!(
                    "{} of {} opportunities ({} filters active)",
                    listed.len(),
                    catalog.len(),
                    criteria.active_filter_count()
                );
            }
        }
        Commands::Show { id } => {
            let catalog = load_catalog().await?;
            let o = catalog
                .iter()
                .find(|o| o.id == id)
                .ok_or_else(|| anyhow!("no opportunity with id '{id}'"))?;
            print_detail(o, Utc::now());
        }
        Commands::Calendar { date } => {
            let catalog = load_catalog().await?;
            let now = Utc::now();
            for o in opportunities_on_date(&catalog, date) {
                println!("{}", summary_line(&o, now));
            }
        }
        Commands::Bookmark { id } => {
            let catalog = load_catalog().await?;
            if !catalog.iter().any(|o| o.id == id) {
                return Err(anyhow!("no opportunity with id '{id}'"));
            }
            let store = open_bookmarks().await;
            let bookmarked = store.toggle(&id).await?;
            println!(
                "{id} {}",
                if bookmarked { "bookmarked" } else { "removed from bookmarks" }
            );
        }
        Commands::Bookmarks => {
            let store = open_bookmarks().await;
            let ids = store.ids().await;
            let catalog = load_catalog().await?;
            let now = Utc::now();
            for o in catalog.iter().filter(|o| ids.contains(&o.id)) {
                println!("{}", summary_line(o, now));
            }
        }
        Commands::Serve => {
            ohub_web::serve_from_env().await?;
        }
    }

    Ok(())
}

async fn load_catalog() -> Result<Vec<Opportunity>> {
    let service = CatalogService::from_config(&CatalogConfig::from_env())?;
    let catalog = service.get_catalog().await;
    if let Some(err) = service.last_error().await {
        eprintln!("warning: external fetch failed, showing local catalog only: {err}");
    }
    Ok(catalog)
}

async fn open_bookmarks() -> BookmarkStore {
    let path =
        std::env::var("OHUB_BOOKMARKS_PATH").unwrap_or_else(|_| "./bookmarks.json".to_string());
    BookmarkStore::open(path).await
}

fn load_criteria(path: &Path) -> Result<FilterCriteria> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("reading criteria file {}", path.display()))?;
    let criteria: FilterCriteria = serde_yaml::from_str(&yaml)
        .with_context(|| format!("parsing criteria file {}", path.display()))?;
    Ok(criteria.normalize())
}

fn extend<T: Ord + Clone>(set: &mut Option<BTreeSet<T>>, values: &[T]) {
    if !values.is_empty() {
        set.get_or_insert_with(BTreeSet::new)
            .extend(values.iter().cloned());
    }
}

fn apply_flags(mut criteria: FilterCriteria, args: &ListArgs) -> FilterCriteria {
    extend(&mut criteria.category, &args.category);
    extend(&mut criteria.mode, &args.mode);
    extend(&mut criteria.level, &args.level);
    extend(&mut criteria.domains, &args.domains);
    criteria.india_only |= args.india;
    criteria.has_stipend |= args.stipend;
    if let Some(status) = args.status {
        criteria.status_filter = status;
    }
    match &args.search {
        Some(q) => criteria.with_search(q.clone()),
        None => criteria.normalize(),
    }
}

fn summary_line(o: &Opportunity, now: DateTime<Utc>) -> String {
    let status = resolve_status(o, now);
    let marker = if is_urgent(o, now) { "!" } else { " " };
    format!(
        "{marker}{:<9}{:>5}d  {:<28} {} ({}, {})",
        status.as_str(),
        days_until_deadline(o.application_end, now),
        o.id,
        o.name,
        o.category.label(),
        o.mode.label()
    )
}

fn print_detail(o: &Opportunity, now: DateTime<Utc>) {
    let status = resolve_status(o, now);
    println!("{} [{}]", o.name, o.id);
    println!("  organizer:   {}", o.organizer);
    println!(
        "  type:        {} / {} / {}",
        o.category.label(),
        o.mode.label(),
        o.level.label()
    );
    println!(
        "  status:      {} ({} days to deadline)",
        status.label(),
        days_until_deadline(o.application_end, now)
    );
    println!(
        "  applications {} .. {}",
        o.application_start.date_naive(),
        o.application_end.date_naive()
    );
    println!(
        "  event        {} .. {}",
        o.event_start.date_naive(),
        o.event_end.date_naive()
    );
    println!(
        "  where:       {}",
        o.location.as_deref().unwrap_or(o.country.as_str())
    );
    if !o.domains.is_empty() {
        println!("  domains:     {}", o.domains.join(", "));
    }
    if let Some(stipend) = &o.stipend {
        println!("  stipend:     {stipend}");
    }
    if let Some(prizes) = &o.prizes {
        println!("  prizes:      {prizes}");
    }
    println!("  link:        {}", o.official_link);
    if !o.description.is_empty() {
        println!();
        println!("{}", o.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_args(argv: &[&str]) -> ListArgs {
        let mut full = vec!["ohub-cli", "list"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Some(Commands::List(args)) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_parse_into_criteria() {
        let args = list_args(&[
            "--category",
            "hackathon,internship",
            "--domain",
            "AI/ML",
            "--india",
            "--status",
            "ongoing",
            "--sort",
            "featured",
            "--now",
            "2025-05-15",
        ]);
        let criteria = apply_flags(FilterCriteria::new(), &args);

        assert_eq!(
            criteria.category,
            Some(BTreeSet::from([Category::Hackathon, Category::Internship]))
        );
        assert_eq!(criteria.domains, Some(BTreeSet::from(["AI/ML".to_string()])));
        assert!(criteria.india_only);
        assert_eq!(criteria.status_filter, StatusFilter::Ongoing);
        assert_eq!(criteria.active_filter_count(), 4);
        assert_eq!(args.sort, SortKey::Featured);
        assert_eq!(args.now, parse_date("2025-05-15"));
    }

    #[test]
    fn unknown_values_are_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["ohub-cli", "list", "--category", "contest"]).is_err());
        assert!(Cli::try_parse_from(["ohub-cli", "list", "--now", "soon"]).is_err());
        assert!(Cli::try_parse_from(["ohub-cli", "calendar", "05/12/2025"]).is_err());
    }

    #[test]
    fn criteria_file_is_merged_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("criteria.yaml");
        std::fs::write(
            &path,
            "category: [fellowship]\nhas_stipend: true\nsearch_query: \"\"\nstatus_filter: upcoming\n",
        )
        .unwrap();

        let base = load_criteria(&path).unwrap();
        assert_eq!(base.search_query, None);
        let criteria = apply_flags(base, &list_args(&["--category", "opensource", "--search", "mentor"]));

        assert_eq!(
            criteria.category,
            Some(BTreeSet::from([Category::Opensource, Category::Fellowship]))
        );
        assert!(criteria.has_stipend);
        assert_eq!(criteria.status_filter, StatusFilter::Upcoming);
        assert_eq!(criteria.search_query.as_deref(), Some("mentor"));
    }

    #[test]
    fn malformed_criteria_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "category: [contest]\n").unwrap();
        let err = load_criteria(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing criteria file"));
    }
}
