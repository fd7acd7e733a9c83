use crate::{
    cluster::{Cluster, ClusterSet, ClusterStats},
    error::{GeoCoverError, GeoCoverResult},
    geo::Coord,
    geopoint::GeoPoint,
    scrape_status::ScrapeStatus,
    store::ClusterStore,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::{collections::BTreeMap, path::Path};

/// Represents a connection to the database where the postcodes and their clusters are stored.
pub struct PostcodeDatabase {
    conn: Connection,
}

impl PostcodeDatabase {
    /// Open a connection to the database, creating the file and the schema if needed.
    pub fn connect<P: AsRef<Path>>(path: P) -> GeoCoverResult<Self> {
        let conn = rusqlite::Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::initialize(conn)
    }

    /// A private database that disappears when the connection is closed.
    pub fn open_in_memory() -> GeoCoverResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> GeoCoverResult<Self> {
        // A 5-second busy time out is WAY too much. If we hit this something has gone terribly wrong.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = PostcodeDatabase { conn };
        db.ensure_schema()?;

        Ok(db)
    }

    /// Make sure the postcodes table and its indexes exist.
    pub fn ensure_schema(&self) -> GeoCoverResult<()> {
        const QUERY: &str = include_str!("database/create_postcode_db.sql");
        self.conn.execute_batch(QUERY)?;

        Ok(())
    }

    /// Prepare to add postcode rows to the database.
    pub fn prepare_to_add_postcodes(&self) -> GeoCoverResult<PostcodeDatabaseAddPostcodes> {
        const QUERY: &str = include_str!("database/add_postcode.sql");

        let add_stmt = self.conn.prepare(QUERY)?;

        Ok(PostcodeDatabaseAddPostcodes {
            add_stmt,
            conn: &self.conn,
        })
    }

    /// Load the clusters as they are currently stored.
    pub fn load_clusters(&self) -> GeoCoverResult<ClusterSet> {
        const QUERY: &str = include_str!("database/query_clusters.sql");
        let mut stmt = self.conn.prepare(QUERY)?;

        let mut clusters = Vec::new();
        let mut assignments = BTreeMap::new();

        let rows = stmt.query_and_then([], |row| -> GeoCoverResult<_> {
            let id: i64 = row.get(0)?;
            let cluster_id = to_cluster_id(id, row.get(1)?)?;
            let is_center: bool = row.get(2)?;
            let covered: Option<String> = row.get(3)?;

            Ok((id, cluster_id, is_center, covered))
        })?;

        for row in rows {
            let (id, cluster_id, is_center, covered) = row?;

            assignments.insert(id, cluster_id);

            if is_center {
                let covered = covered.ok_or_else(|| GeoCoverError::CorruptRow {
                    id,
                    reason: "cluster center without covered postcodes".to_owned(),
                })?;

                clusters.push(Cluster {
                    cluster_id,
                    center_id: id,
                    covered: decode_id_list(id, &covered)?,
                });
            }
        }

        clusters.sort_by_key(|c| c.cluster_id);

        Ok(ClusterSet {
            clusters,
            assignments,
        })
    }

    /// Statistics about the clusters as they are currently stored.
    pub fn cluster_stats(&self) -> GeoCoverResult<ClusterStats> {
        Ok(self.load_clusters()?.stats())
    }

    /// Find the cluster that should be searched next.
    ///
    /// Clusters that have never been scraped come first, then the ones scraped longest ago.
    /// Anything scraped less than `stale_after` before `now` is skipped.
    pub fn next_cluster(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> GeoCoverResult<Option<ClusterRow>> {
        const QUERY: &str = include_str!("database/query_next_cluster.sql");

        let cutoff = now
            .checked_sub_signed(stale_after)
            .ok_or(GeoCoverError::InvalidStaleWindow(stale_after))?
            .timestamp();

        let row = self
            .conn
            .query_row(QUERY, [cutoff], raw_cluster_row)
            .optional()?;

        row.map(ClusterRow::try_from).transpose()
    }

    /// Get a single cluster by id.
    pub fn cluster_row(&self, cluster_id: u32) -> GeoCoverResult<ClusterRow> {
        const QUERY: &str = include_str!("database/query_cluster_center.sql");

        let row = self
            .conn
            .query_row(QUERY, [cluster_id], raw_cluster_row)
            .optional()?
            .ok_or(GeoCoverError::UnknownCluster(cluster_id))?;

        ClusterRow::try_from(row)
    }

    /// Record that a cluster was searched.
    ///
    /// The cluster's own timestamp lives on its center row and is only written here, for this
    /// cluster. Every postcode it covers also gets its `last_scraped` stamp, which clusters that
    /// overlap this one do not read.
    pub fn mark_cluster_scraped(
        &mut self,
        cluster_id: u32,
        when: DateTime<Utc>,
    ) -> GeoCoverResult<usize> {
        const STAMP_QUERY: &str = include_str!("database/update_last_scraped.sql");
        const CLUSTER_QUERY: &str = include_str!("database/update_cluster_scraped.sql");

        let cluster = self.cluster_row(cluster_id)?;
        let when = when.timestamp();

        let tx = self.conn.transaction()?;
        let mut num_stamped = 0;
        {
            let mut stamp_stmt = tx.prepare(STAMP_QUERY)?;
            for point_id in &cluster.covered {
                num_stamped += stamp_stmt.execute(params![point_id, when])?;
            }

            tx.execute(CLUSTER_QUERY, params![cluster_id, when])?;
        }
        tx.commit()?;

        debug!(
            "Stamped {} postcodes as scraped for cluster {}",
            num_stamped, cluster_id
        );

        Ok(num_stamped)
    }

    /// Update the workflow status of a cluster.
    pub fn set_scrape_status(
        &self,
        cluster_id: u32,
        status: ScrapeStatus,
        error_message: Option<&str>,
    ) -> GeoCoverResult<()> {
        const QUERY: &str = include_str!("database/update_scrape_status.sql");

        let updated = self.conn.execute(
            QUERY,
            params![
                cluster_id,
                status.name(),
                error_message,
                Utc::now().timestamp()
            ],
        )?;

        if updated == 0 {
            return Err(GeoCoverError::UnknownCluster(cluster_id));
        }

        Ok(())
    }

    /// The workflow status of a cluster.
    pub fn scrape_status(&self, cluster_id: u32) -> GeoCoverResult<(ScrapeStatus, Option<String>)> {
        let (status, message): (String, Option<String>) = self
            .conn
            .query_row(
                "SELECT scrape_status, error_message FROM postcodes
                 WHERE is_cluster_center = 1 AND cluster_id = ?1",
                [cluster_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(GeoCoverError::UnknownCluster(cluster_id))?;

        Ok((ScrapeStatus::parse(&status)?, message))
    }
}

impl ClusterStore for PostcodeDatabase {
    fn fetch_points(&mut self) -> GeoCoverResult<Vec<GeoPoint>> {
        const QUERY: &str = include_str!("database/query_geocoded_points.sql");
        let mut stmt = self.conn.prepare(QUERY)?;

        let rows = stmt
            .query_and_then([], |row| -> rusqlite::Result<GeoPoint> {
                let id: i64 = row.get(0)?;
                let postcode: String = row.get(1)?;
                let lat: f64 = row.get(2)?;
                let lon: f64 = row.get(3)?;

                Ok(GeoPoint::new(id, postcode, lat, lon))
            })?;

        let mut points = Vec::new();
        for res in rows {
            match res {
                Ok(pnt) => points.push(pnt),
                Err(err) if is_row_conversion_error(&err) => {
                    warn!("Skipping postcode with unreadable location - {}", err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(points)
    }

    fn reset_clusters(&mut self) -> GeoCoverResult<usize> {
        const QUERY: &str = include_str!("database/reset_clusters.sql");

        let tx = self.conn.transaction()?;
        let num_reset = tx.execute(QUERY, [])?;
        tx.commit()?;

        Ok(num_reset)
    }

    fn write_clusters(&mut self, clusters: &ClusterSet) -> GeoCoverResult<()> {
        const CENTER_QUERY: &str = include_str!("database/update_cluster_center.sql");
        const MEMBER_QUERY: &str = include_str!("database/update_cluster_member.sql");

        let now = Utc::now().timestamp();

        let tx = self.conn.transaction()?;
        {
            let mut center_stmt = tx.prepare(CENTER_QUERY)?;
            let mut member_stmt = tx.prepare(MEMBER_QUERY)?;

            for cluster in &clusters.clusters {
                let covered = encode_id_list(&cluster.covered);
                let updated = center_stmt.execute(params![
                    cluster.center_id,
                    cluster.cluster_id,
                    covered,
                    now
                ])?;

                if updated == 0 {
                    return Err(GeoCoverError::CorruptRow {
                        id: cluster.center_id,
                        reason: "cluster center is missing from the database".to_owned(),
                    });
                }
            }

            for (point_id, cluster_id) in &clusters.assignments {
                member_stmt.execute(params![point_id, cluster_id, now])?;
            }
        }
        tx.commit()?;

        info!(
            "Wrote {} clusters covering {} postcodes.",
            clusters.len(),
            clusters.assignments.len()
        );

        Ok(())
    }
}

/// A new row for the postcodes table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPostcode {
    /// Leave empty to let the database pick the next id.
    pub id: Option<i64>,
    pub postcode: String,
    pub locality: Option<String>,
    pub country: Option<String>,
    /// Postcodes that haven't been geocoded yet have no location.
    pub coord: Option<Coord>,
}

impl NewPostcode {
    pub fn new<S: Into<String>>(postcode: S, coord: Option<Coord>) -> Self {
        NewPostcode {
            id: None,
            postcode: postcode.into(),
            locality: None,
            country: None,
            coord,
        }
    }
}

pub struct PostcodeDatabaseAddPostcodes<'a> {
    add_stmt: rusqlite::Statement<'a>,
    conn: &'a Connection,
}

impl<'a> PostcodeDatabaseAddPostcodes<'a> {
    /// Add a batch of postcodes in a single transaction, returning their row ids.
    pub fn add(&mut self, postcodes: &[NewPostcode]) -> GeoCoverResult<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(postcodes.len());

        for pc in postcodes {
            let (lat, lon) = match pc.coord {
                Some(Coord { lat, lon }) => (Some(lat), Some(lon)),
                None => (None, None),
            };

            self.add_stmt.execute(params![
                pc.id,
                pc.postcode,
                pc.locality,
                pc.country,
                lat,
                lon
            ])?;

            ids.push(self.conn.last_insert_rowid());
        }

        tx.commit()?;

        Ok(ids)
    }
}

/// A cluster center as stored in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRow {
    pub cluster_id: u32,
    pub center_id: i64,
    pub postcode: String,
    pub locality: Option<String>,
    pub center: Coord,
    /// Ids of every postcode within the radius of the center, ascending.
    pub covered: Vec<i64>,
    pub last_scraped: Option<DateTime<Utc>>,
}

struct RawClusterRow {
    id: i64,
    postcode: String,
    locality: Option<String>,
    lat: f64,
    lon: f64,
    cluster_id: i64,
    covered: Option<String>,
    last_scraped: Option<i64>,
}

fn raw_cluster_row(row: &rusqlite::Row) -> rusqlite::Result<RawClusterRow> {
    Ok(RawClusterRow {
        id: row.get(0)?,
        postcode: row.get(1)?,
        locality: row.get(2)?,
        lat: row.get(3)?,
        lon: row.get(4)?,
        cluster_id: row.get(5)?,
        covered: row.get(6)?,
        last_scraped: row.get(7)?,
    })
}

impl TryFrom<RawClusterRow> for ClusterRow {
    type Error = GeoCoverError;

    fn try_from(raw: RawClusterRow) -> Result<Self, Self::Error> {
        let id = raw.id;

        let covered = raw.covered.ok_or_else(|| GeoCoverError::CorruptRow {
            id,
            reason: "cluster center without covered postcodes".to_owned(),
        })?;

        let last_scraped = raw
            .last_scraped
            .map(|ts| {
                Utc.timestamp_opt(ts, 0)
                    .single()
                    .ok_or_else(|| GeoCoverError::CorruptRow {
                        id,
                        reason: format!("invalid last_scraped timestamp {}", ts),
                    })
            })
            .transpose()?;

        Ok(ClusterRow {
            cluster_id: to_cluster_id(id, raw.cluster_id)?,
            center_id: id,
            postcode: raw.postcode,
            locality: raw.locality,
            center: Coord {
                lat: raw.lat,
                lon: raw.lon,
            },
            covered: decode_id_list(id, &covered)?,
            last_scraped,
        })
    }
}

/// Errors that only concern the values in one row. Anything else is the store failing.
fn is_row_conversion_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
    )
}

fn to_cluster_id(row_id: i64, value: i64) -> GeoCoverResult<u32> {
    u32::try_from(value).map_err(|_| GeoCoverError::CorruptRow {
        id: row_id,
        reason: format!("cluster id {} out of range", value),
    })
}

fn encode_id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_id_list(row_id: i64, txt: &str) -> GeoCoverResult<Vec<i64>> {
    txt.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim().parse::<i64>().map_err(|err| GeoCoverError::CorruptRow {
                id: row_id,
                reason: format!("bad id '{}' in cluster_postcodes: {}", s, err),
            })
        })
        .collect()
}
