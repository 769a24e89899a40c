use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use diecast_catalog::{CreateNamed, NamedEntity, NamedKind, UpdateNamed};
use diecast_core::{CatalogError, CatalogResult, Envelope, Page, PageLimits, PaginationQuery};

use super::{duplicate_name, write_error};
use crate::listing::{NamedListing, PaginatedQueryEngine};
use crate::store::{CatalogStore, CatalogTx, LookupField};

/// Create/list/find/update/remove for one named-entity kind.
///
/// Categories, trademarks and brands share this implementation; the kind
/// picks the table, the envelope key and the message wording.
#[derive(Debug)]
pub struct NamedEntityService<S> {
    store: Arc<S>,
    kind: NamedKind,
    limits: PageLimits,
    engine: PaginatedQueryEngine,
}

impl<S> Clone for NamedEntityService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            kind: self.kind,
            limits: self.limits,
            engine: self.engine,
        }
    }
}

impl<S: CatalogStore> NamedEntityService<S> {
    pub fn new(store: Arc<S>, kind: NamedKind, limits: PageLimits) -> Self {
        Self {
            store,
            kind,
            limits,
            engine: PaginatedQueryEngine::new(),
        }
    }

    pub fn kind(&self) -> NamedKind {
        self.kind
    }

    #[instrument(skip(self, cmd), fields(kind = %self.kind, name = %cmd.name), err)]
    pub async fn create(&self, cmd: CreateNamed) -> CatalogResult<Envelope<NamedEntity>> {
        cmd.validate()?;

        let mut tx = self.store.begin().await?;
        let entity = NamedEntity::new(cmd.name, Utc::now());
        self.ensure_unique(&mut tx, &entity).await?;

        tx.insert_named(self.kind, &entity)
            .await
            .map_err(write_error(self.kind.label()))?;
        tx.commit().await?;

        info!(id = %entity.id, slug = %entity.slug, "created");
        Ok(self.envelope("created successfully", entity))
    }

    #[instrument(skip(self, query), fields(kind = %self.kind), err)]
    pub async fn find_all(&self, query: PaginationQuery) -> CatalogResult<Page<NamedEntity>> {
        let request = query.resolve(self.limits)?;
        let mut tx = self.store.snapshot().await?;
        self.engine
            .run(&mut tx, &NamedListing(self.kind), &request)
            .await
    }

    /// Resolve by id or slug. An id match takes precedence.
    #[instrument(skip(self), fields(kind = %self.kind), err)]
    pub async fn find_one(&self, term: &str) -> CatalogResult<Envelope<NamedEntity>> {
        let mut tx = self.store.snapshot().await?;

        if let Ok(id) = Uuid::parse_str(term) {
            if let Some(entity) = tx.find_named(self.kind, id).await? {
                return Ok(self.envelope("found", entity));
            }
        }

        match tx.find_named_by(self.kind, LookupField::Slug, term).await? {
            Some(entity) => Ok(self.envelope("found", entity)),
            None => Err(self.not_found()),
        }
    }

    #[instrument(skip(self, cmd), fields(kind = %self.kind, id = %id), err)]
    pub async fn update(&self, id: Uuid, cmd: UpdateNamed) -> CatalogResult<Envelope<NamedEntity>> {
        cmd.validate()?;

        let mut tx = self.store.begin().await?;
        let mut entity = tx
            .find_named(self.kind, id)
            .await?
            .ok_or_else(|| self.not_found())?;

        let Some(name) = cmd.name.filter(|name| *name != entity.name) else {
            debug!("no changes");
            return Ok(self.envelope("updated", entity));
        };

        entity.rename(name, Utc::now());
        self.ensure_unique(&mut tx, &entity).await?;

        let updated = tx
            .update_named(self.kind, &entity)
            .await
            .map_err(write_error(self.kind.label()))?;
        if !updated {
            return Err(self.not_found());
        }
        tx.commit().await?;

        info!(slug = %entity.slug, "updated");
        Ok(self.envelope("updated", entity))
    }

    /// Delete by id. Rejected while products still reference the record.
    #[instrument(skip(self), fields(kind = %self.kind, id = %id), err)]
    pub async fn remove(&self, id: Uuid) -> CatalogResult<Envelope<NamedEntity>> {
        let mut tx = self.store.begin().await?;
        let entity = tx
            .find_named(self.kind, id)
            .await?
            .ok_or_else(|| self.not_found())?;

        let dependents = tx.count_dependents(self.kind, id).await?;
        if dependents > 0 {
            return Err(CatalogError::conflict(format!(
                "{} is still referenced by {dependents} product(s)",
                self.kind.label()
            )));
        }

        if !tx.delete_named(self.kind, id).await? {
            return Err(self.not_found());
        }
        tx.commit().await?;

        info!("deleted");
        Ok(self.envelope("deleted", entity))
    }

    /// Name and slug must not belong to any other record of this kind.
    async fn ensure_unique(&self, tx: &mut S::Tx, entity: &NamedEntity) -> CatalogResult<()> {
        for (field, value) in [
            (LookupField::Name, entity.name.as_str()),
            (LookupField::Slug, entity.slug.as_str()),
        ] {
            if let Some(existing) = tx.find_named_by(self.kind, field, value).await? {
                if existing.id != entity.id {
                    return Err(duplicate_name(self.kind.label()));
                }
            }
        }
        Ok(())
    }

    fn envelope(&self, verb: &str, entity: NamedEntity) -> Envelope<NamedEntity> {
        Envelope::new(
            format!("{} {verb}", self.kind.label()),
            self.kind.entity_key(),
            entity,
        )
    }

    fn not_found(&self) -> CatalogError {
        CatalogError::not_found(format!("{} not found", self.kind.label()))
    }
}
