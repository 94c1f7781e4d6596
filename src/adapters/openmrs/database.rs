//! OpenMRS database reader
//!
//! Reads the `obs` table directly, joined with names, concepts, encounters,
//! providers and locations. Pages use keyset pagination on
//! `(date_created, obs_id)` so a page never skips or repeats rows while new
//! observations are being written.
//!
//! Every non-voided row reaches the engine. A concept without a name in the
//! configured locale gets a placeholder label, and a person without a
//! preferred name comes through with empty names so the resolver reports it
//! as unmatched.

use crate::adapters::postgresql::{PoolRole, PostgreSQLClient};
use crate::adapters::source::{paged, ObservationSource, ObservationStream, SourceConnector};
use crate::config::PostgreSQLConfig;
use crate::domain::{
    EngineError, ObservationValue, Result, SourceCursor, SourceError, SourceObservation,
    SourceObservationId, SourcePerson, SourcePersonId,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_postgres::Row;

const OBSERVATIONS_SQL: &str = r#"
    SELECT DISTINCT ON (o.date_created, o.obs_id)
        o.obs_id::bigint AS obs_id,
        o.person_id::text AS person_id,
        pn.given_name,
        pn.family_name,
        COALESCE(
            cn.name,
            'Unknown Concept (' || o.concept_id::text || ')'
        ) AS concept_name,
        o.value_text,
        o.value_numeric::float8 AS value_numeric,
        vcn.name AS value_coded_name,
        o.obs_datetime,
        o.date_created,
        o.encounter_id::text AS encounter_id,
        COALESCE(
            NULLIF(btrim(concat_ws(' ', ppn.given_name, ppn.family_name)), ''),
            prov.identifier,
            NULLIF(btrim(concat_ws(' ', cpn.given_name, cpn.family_name)), ''),
            u.username
        ) AS provider_name,
        COALESCE(el.name, ol.name) AS location_name,
        o.comments
    FROM obs o
    LEFT JOIN person_name pn
        ON pn.person_id = o.person_id AND pn.preferred AND NOT pn.voided
    LEFT JOIN concept_name cn
        ON cn.concept_id = o.concept_id
        AND cn.locale = $4
        AND cn.concept_name_type = 'FULLY_SPECIFIED'
        AND NOT cn.voided
    LEFT JOIN concept_name vcn
        ON vcn.concept_id = o.value_coded
        AND vcn.locale = $4
        AND vcn.concept_name_type = 'FULLY_SPECIFIED'
        AND NOT vcn.voided
    LEFT JOIN encounter e ON e.encounter_id = o.encounter_id
    LEFT JOIN location el ON el.location_id = e.location_id
    LEFT JOIN location ol ON ol.location_id = o.location_id
    LEFT JOIN encounter_provider ep
        ON ep.encounter_id = o.encounter_id AND NOT ep.voided
    LEFT JOIN provider prov ON prov.provider_id = ep.provider_id
    LEFT JOIN person_name ppn
        ON ppn.person_id = prov.person_id AND ppn.preferred AND NOT ppn.voided
    LEFT JOIN users u ON u.user_id = o.creator
    LEFT JOIN person_name cpn
        ON cpn.person_id = u.person_id AND cpn.preferred AND NOT cpn.voided
    WHERE NOT o.voided
        AND (
            $1::timestamp IS NULL
            OR o.date_created > $1::timestamp
            OR (o.date_created = $1::timestamp AND o.obs_id::bigint > $2::bigint)
        )
        AND ($5::text IS NULL OR o.person_id::text = $5::text)
    ORDER BY o.date_created, o.obs_id
    LIMIT $3
"#;

/// Keyset position: `(date_created, obs_id)` of the last row read
#[derive(Debug, Clone, Copy)]
struct KeysetPosition {
    after: Option<(NaiveDateTime, i64)>,
    exhausted: bool,
}

impl KeysetPosition {
    fn from_cursor(cursor: Option<&SourceCursor>) -> Result<Self> {
        let after = match cursor {
            Some(cursor) => {
                let obs_id = cursor.source_id.as_str().parse::<i64>().map_err(|_| {
                    EngineError::State(format!(
                        "Checkpoint id '{}' is not an OpenMRS obs_id",
                        cursor.source_id
                    ))
                })?;
                Some((cursor.recorded_at.naive_utc(), obs_id))
            }
            None => None,
        };
        Ok(Self {
            after,
            exhausted: false,
        })
    }
}

/// Reader over the OpenMRS database
pub struct DatabaseObservationSource {
    client: PostgreSQLClient,
    locale: String,
}

impl DatabaseObservationSource {
    pub fn new(client: PostgreSQLClient, locale: impl Into<String>) -> Self {
        Self {
            client,
            locale: locale.into(),
        }
    }

    async fn fetch_page(
        &self,
        position: KeysetPosition,
        page_size: usize,
        person: Option<String>,
    ) -> Result<Option<(Vec<Result<SourceObservation>>, KeysetPosition)>> {
        if position.exhausted {
            return Ok(None);
        }

        let after_created = position.after.map(|(created, _)| created);
        let after_id = position.after.map(|(_, id)| id).unwrap_or(0);
        let limit = page_size as i64;

        let rows = self
            .client
            .query(
                OBSERVATIONS_SQL,
                &[&after_created, &after_id, &limit, &self.locale, &person],
            )
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut last = position.after;
        for row in &rows {
            let created: NaiveDateTime = row.try_get("date_created").map_err(invalid_row)?;
            let obs_id: i64 = row.try_get("obs_id").map_err(invalid_row)?;
            last = Some((created, obs_id));
            items.push(observation_from_row(row));
        }

        tracing::debug!(rows = rows.len(), "Fetched OpenMRS obs page");

        let next = KeysetPosition {
            after: last,
            exhausted: rows.len() < page_size,
        };
        Ok(Some((items, next)))
    }
}

fn invalid_row(e: tokio_postgres::Error) -> EngineError {
    SourceError::InvalidResponse(format!("Unexpected obs row: {e}")).into()
}

/// Decodes one result row.
///
/// Failures here only concern this observation and are reported as
/// [`EngineError::Validation`].
fn observation_from_row(row: &Row) -> Result<SourceObservation> {
    let column = |e: tokio_postgres::Error| EngineError::Validation(format!("Bad obs row: {e}"));

    let obs_id: i64 = row.try_get("obs_id").map_err(column)?;
    let person_id: String = row.try_get("person_id").map_err(column)?;
    let given_name: Option<String> = row.try_get("given_name").map_err(column)?;
    let family_name: Option<String> = row.try_get("family_name").map_err(column)?;
    let concept_name: String = row.try_get("concept_name").map_err(column)?;
    let value_text: Option<String> = row.try_get("value_text").map_err(column)?;
    let value_numeric: Option<f64> = row.try_get("value_numeric").map_err(column)?;
    let value_coded: Option<String> = row.try_get("value_coded_name").map_err(column)?;
    let obs_datetime: NaiveDateTime = row.try_get("obs_datetime").map_err(column)?;
    let date_created: NaiveDateTime = row.try_get("date_created").map_err(column)?;

    let person = SourcePerson::new(
        SourcePersonId::new(person_id).map_err(EngineError::Validation)?,
        given_name.unwrap_or_default(),
        family_name.unwrap_or_default(),
    );

    SourceObservation::builder()
        .source_id(
            SourceObservationId::new(obs_id.to_string()).map_err(EngineError::Validation)?,
        )
        .person(person)
        .concept_name(concept_name)
        .value(ObservationValue::resolve(value_text, value_numeric, value_coded))
        .observed_at(obs_datetime.and_utc())
        .recorded_at(date_created.and_utc())
        .encounter_id(row.try_get("encounter_id").map_err(column)?)
        .provider_name(row.try_get("provider_name").map_err(column)?)
        .location_name(row.try_get("location_name").map_err(column)?)
        .comments(row.try_get("comments").map_err(column)?)
        .build()
        .map_err(EngineError::Validation)
}

#[async_trait]
impl ObservationSource for DatabaseObservationSource {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    fn observations(
        &self,
        since: Option<SourceCursor>,
        page_size: usize,
    ) -> ObservationStream<'_> {
        match KeysetPosition::from_cursor(since.as_ref()) {
            Ok(start) => paged(start, move |position| {
                self.fetch_page(position, page_size, None)
            }),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    fn person_observations(
        &self,
        person: &SourcePersonId,
        page_size: usize,
    ) -> ObservationStream<'_> {
        let person = person.as_str().to_string();
        let start = KeysetPosition {
            after: None,
            exhausted: false,
        };
        paged(start, move |position| {
            self.fetch_page(position, page_size, Some(person.clone()))
        })
    }

    fn describe(&self) -> String {
        format!("openmrs database ({})", self.client.connection_string_safe())
    }
}

/// Opens a fresh connection pool to the OpenMRS database per run
pub struct DatabaseConnector {
    config: PostgreSQLConfig,
    locale: String,
}

impl DatabaseConnector {
    pub fn new(config: PostgreSQLConfig, locale: impl Into<String>) -> Self {
        Self {
            config,
            locale: locale.into(),
        }
    }
}

#[async_trait]
impl SourceConnector for DatabaseConnector {
    async fn connect(&self) -> Result<Arc<dyn ObservationSource>> {
        let client = PostgreSQLClient::new(self.config.clone(), PoolRole::Source)?;
        Ok(Arc::new(DatabaseObservationSource::new(
            client,
            self.locale.clone(),
        )))
    }
}
