use chrono::{Duration, Utc};
use clap::Parser;
use geocover::{ClusterRow, PostcodeDatabase, ScrapeStatus};
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::{error::Error, path::PathBuf};

/*-------------------------------------------------------------------------------------------------
 *                                     Command Line Options
 *-----------------------------------------------------------------------------------------------*/

///
/// Find the next cluster to search.
///
/// Clusters that have never been searched come first, followed by the ones searched longest ago.
/// Clusters searched more recently than the staleness window are skipped.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "nextcluster")]
#[clap(author, version, about)]
struct NextClusterOptions {
    /// The path to the postcode database file.
    ///
    /// If this is not specified, then the program will check for it in the "POSTCODE_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "POSTCODE_DB")]
    database: PathBuf,

    /// Days after a search before a cluster is due again.
    #[clap(short, long)]
    #[clap(env = "CLUSTER_STALE_DAYS")]
    #[clap(default_value_t = 7)]
    stale_days: u32,

    /// Mark the cluster as being worked on.
    #[clap(short, long)]
    claim: bool,

    /// Stamp every postcode in the cluster as searched now.
    #[clap(short, long)]
    mark_scraped: bool,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn log_cluster(cluster: &ClusterRow) {
    let last_scraped = cluster
        .last_scraped
        .map(|ts| ts.to_string())
        .unwrap_or_else(|| "never".to_owned());

    info!("");
    info!("Next cluster to search:");
    info!("       cluster - {:>19}", cluster.cluster_id);
    info!("      postcode - {:>19}", cluster.postcode);
    info!(
        "      locality - {:>19}",
        cluster.locality.as_deref().unwrap_or("-")
    );
    info!("      latitude - {:>19.6}", cluster.center.lat);
    info!("     longitude - {:>19.6}", cluster.center.lon);
    info!("     postcodes - {:>19}", cluster.covered.len());
    info!("  last scraped - {:>19}", last_scraped);
    info!("");
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    let opts = NextClusterOptions::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .with_module_level("geocover", level)
        .with_module_level("nextcluster", level)
        .init()?;

    let mut db = PostcodeDatabase::connect(&opts.database)?;

    let now = Utc::now();
    let stale_after = Duration::days(i64::from(opts.stale_days));

    let cluster = match db.next_cluster(now, stale_after)? {
        Some(cluster) => cluster,
        None => {
            warn!("No more areas to process");
            return Ok(());
        }
    };

    log_cluster(&cluster);

    if opts.claim {
        db.set_scrape_status(cluster.cluster_id, ScrapeStatus::Processing, None)?;
        info!("Claimed cluster {}", cluster.cluster_id);
    }

    if opts.mark_scraped {
        let num_stamped = db.mark_cluster_scraped(cluster.cluster_id, now)?;
        info!(
            "Updated {} postcodes in cluster {}",
            num_stamped, cluster.cluster_id
        );
    }

    Ok(())
}
