//! Hotel reservations
//!
//! Bookings are stored one document per night. The number of rooms booked
//! for a night is cached under `"{hotel}_{in}_{out}"` and a hotel's room
//! capacity under `"{hotel}_cap"`; both are derived from the store on a
//! miss. A hotel without a capacity record has no rooms.

use chrono::NaiveDate;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use trellis_core::{doc, Error, Result};
use trellis_primitives::{Cache, CacheExt};
use trellis_storage::{CollectionExt, NoSqlCollection};

use crate::model::{HotelCapacity, Reservation};
use crate::repository::RepositoryStats;

const DATE_FORMAT: &str = "%Y-%m-%d";
const CONFIRMATION_KEY: &str = "reservation:seq";

fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| Error::invalid_argument(format!("bad date {:?}: {}", date, e)))
}

/// Consecutive `(in, out)` night pairs between two dates
fn nights(in_date: &str, out_date: &str) -> Result<Vec<(String, String)>> {
    let start = parse_date(in_date)?;
    let end = parse_date(out_date)?;
    if end <= start {
        return Err(Error::invalid_argument(format!(
            "check-out {} is not after check-in {}",
            out_date, in_date
        )));
    }
    Ok(start
        .iter_days()
        .take_while(|day| *day < end)
        .map(|day| {
            let next = day + chrono::Duration::days(1);
            (
                day.format(DATE_FORMAT).to_string(),
                next.format(DATE_FORMAT).to_string(),
            )
        })
        .collect())
}

fn night_key(hotel_id: &str, night: &(String, String)) -> String {
    format!("{}_{}_{}", hotel_id, night.0, night.1)
}

fn capacity_key(hotel_id: &str) -> String {
    format!("{}_cap", hotel_id)
}

/// Room bookings against per-hotel capacity
pub struct ReservationService {
    cache: Arc<dyn Cache>,
    reservations: Arc<dyn NoSqlCollection>,
    capacities: Arc<dyn NoSqlCollection>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl ReservationService {
    /// Service over the reservation cache and its two collections
    pub fn new(
        cache: Arc<dyn Cache>,
        reservations: Arc<dyn NoSqlCollection>,
        capacities: Arc<dyn NoSqlCollection>,
    ) -> Self {
        ReservationService {
            cache,
            reservations,
            capacities,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Record the room capacity of a hotel
    pub async fn set_capacity(&self, hotel_id: &str, rooms: i64) -> Result<()> {
        let record = HotelCapacity {
            hotel_id: hotel_id.to_string(),
            rooms,
        };
        self.capacities
            .upsert(&doc! { "hotel_id": hotel_id }, trellis_core::to_document(&record)?)
            .await?;
        self.cache.delete(&capacity_key(hotel_id)).await
    }

    /// Load the demo hotels `1..=80` with their standard capacities
    pub async fn seed_default_capacities(&self) -> Result<()> {
        for i in 1..=80 {
            let rooms = match i {
                1..=6 => 200,
                _ if i % 3 == 1 => 300,
                _ if i % 3 == 2 => 250,
                _ => 200,
            };
            self.set_capacity(&i.to_string(), rooms).await?;
        }
        info!(target: "trellis::services", hotels = 80, "Seeded hotel capacities");
        Ok(())
    }

    async fn cached_i64(&self, key: &str) -> Result<Option<i64>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.cache.get_as::<i64>(key).await?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn booked(&self, hotel_id: &str, night: &(String, String)) -> Result<i64> {
        let key = night_key(hotel_id, night);
        if let Some(count) = self.cached_i64(&key).await? {
            return Ok(count);
        }
        let filter = doc! { "hotel_id": hotel_id, "in_date": night.0, "out_date": night.1 };
        let booked: Vec<Reservation> = self.reservations.find_many_as(&filter).await?;
        let count: i64 = booked.iter().map(|r| r.rooms).sum();
        self.cache.put_as(&key, &count).await?;
        Ok(count)
    }

    async fn capacity(&self, hotel_id: &str) -> Result<i64> {
        let key = capacity_key(hotel_id);
        if let Some(rooms) = self.cached_i64(&key).await? {
            return Ok(rooms);
        }
        let record: Option<HotelCapacity> = self
            .capacities
            .find_one_as(&doc! { "hotel_id": hotel_id })
            .await?;
        let rooms = record.map(|r| r.rooms).unwrap_or(0);
        self.cache.put_as(&key, &rooms).await?;
        Ok(rooms)
    }

    /// Booked counts after adding `rooms` to every night, or `None` if
    /// some night would exceed capacity
    async fn plan(
        &self,
        hotel_id: &str,
        nights: &[(String, String)],
        rooms: i64,
    ) -> Result<Option<Vec<i64>>> {
        let capacity = self.capacity(hotel_id).await?;
        let mut totals = Vec::with_capacity(nights.len());
        for night in nights {
            let total = self.booked(hotel_id, night).await? + rooms;
            if total > capacity {
                debug!(target: "trellis::services", hotel_id, night = %night.0, total, capacity, "Night is full");
                return Ok(None);
            }
            totals.push(total);
        }
        Ok(Some(totals))
    }

    /// Book `rooms` at `hotel_id` for every night in `[in_date, out_date)`.
    ///
    /// Returns the confirmation number, or `None` if some night is full.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unparsable dates, an empty stay or a
    /// non-positive room count.
    pub async fn make_reservation(
        &self,
        customer_name: &str,
        hotel_id: &str,
        in_date: &str,
        out_date: &str,
        rooms: i64,
    ) -> Result<Option<i64>> {
        if rooms <= 0 {
            return Err(Error::invalid_argument("room count must be positive"));
        }
        let nights = nights(in_date, out_date)?;
        let Some(totals) = self.plan(hotel_id, &nights, rooms).await? else {
            return Ok(None);
        };

        let confirmation = self.cache.incr(CONFIRMATION_KEY).await?;
        let docs = nights
            .iter()
            .map(|(night_in, night_out)| {
                trellis_core::to_document(&Reservation {
                    confirmation,
                    hotel_id: hotel_id.to_string(),
                    customer_name: customer_name.to_string(),
                    in_date: night_in.clone(),
                    out_date: night_out.clone(),
                    rooms,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.reservations.insert_many(docs).await?;

        let keys: Vec<String> = nights.iter().map(|n| night_key(hotel_id, n)).collect();
        self.cache.mset_as(&keys, &totals).await?;
        info!(target: "trellis::services", confirmation, hotel_id, customer_name, nights = nights.len(), "Reservation made");
        Ok(Some(confirmation))
    }

    /// The hotels among `hotel_ids` with `rooms` free on every night of
    /// the stay, in input order
    pub async fn check_availability(
        &self,
        hotel_ids: &[String],
        in_date: &str,
        out_date: &str,
        rooms: i64,
    ) -> Result<Vec<String>> {
        let nights = nights(in_date, out_date)?;
        let mut available = Vec::new();
        for hotel_id in hotel_ids {
            if self.plan(hotel_id, &nights, rooms).await?.is_some() {
                available.push(hotel_id.clone());
            }
        }
        Ok(available)
    }

    /// Cache counters for capacity and booking lookups
    pub fn stats(&self) -> RepositoryStats {
        let requests = self.requests.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        RepositoryStats {
            requests,
            hits,
            misses: requests - hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_primitives::MemoryCache;
    use trellis_storage::MemoryCollection;

    fn service() -> (ReservationService, Arc<MemoryCache>, Arc<MemoryCollection>) {
        let cache = Arc::new(MemoryCache::new());
        let reservations = Arc::new(MemoryCollection::new("reservation"));
        let service = ReservationService::new(
            cache.clone(),
            reservations.clone(),
            Arc::new(MemoryCollection::new("number")),
        );
        (service, cache, reservations)
    }

    #[test]
    fn test_nights_span_stay() {
        let n = nights("2015-04-09", "2015-04-12").unwrap();
        assert_eq!(n.len(), 3);
        assert_eq!(n[0], ("2015-04-09".to_string(), "2015-04-10".to_string()));
        assert_eq!(n[2], ("2015-04-11".to_string(), "2015-04-12".to_string()));
        assert!(nights("2015-04-10", "2015-04-10").is_err());
        assert!(nights("April 9", "2015-04-10").is_err());
    }

    #[tokio::test]
    async fn test_reserve_and_check() {
        let (service, cache, reservations) = service();
        service.seed_default_capacities().await.unwrap();

        let available = service
            .check_availability(&["1".into()], "2015-04-09", "2015-04-10", 1)
            .await
            .unwrap();
        assert_eq!(available, vec!["1"]);

        let confirmation = service
            .make_reservation("Vaastav", "1", "2015-04-09", "2015-04-11", 1)
            .await
            .unwrap();
        assert_eq!(confirmation, Some(1));
        assert_eq!(reservations.len(), 2);
        assert_eq!(
            cache.get_as::<i64>("1_2015-04-10_2015-04-11").await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_full_hotel_is_refused() {
        let (service, _, reservations) = service();
        service.set_capacity("h", 2).await.unwrap();

        assert!(service
            .make_reservation("a", "h", "2020-01-01", "2020-01-02", 2)
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            service
                .make_reservation("b", "h", "2020-01-01", "2020-01-02", 1)
                .await
                .unwrap(),
            None
        );
        assert_eq!(reservations.len(), 1);

        let available = service
            .check_availability(&["h".into(), "unknown".into()], "2020-01-02", "2020-01-03", 1)
            .await
            .unwrap();
        assert_eq!(available, vec!["h"]);
    }

    #[tokio::test]
    async fn test_counts_rebuild_from_store() {
        let (service, cache, _) = service();
        service.set_capacity("h", 3).await.unwrap();
        service
            .make_reservation("a", "h", "2020-01-01", "2020-01-02", 2)
            .await
            .unwrap();
        cache.delete_all().await.unwrap();

        assert!(service
            .make_reservation("b", "h", "2020-01-01", "2020-01-02", 2)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_non_positive_rooms_rejected() {
        let (service, _, _) = service();
        let err = service
            .make_reservation("a", "1", "2020-01-01", "2020-01-02", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
