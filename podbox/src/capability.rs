// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capabilities a pipeline exposes to the outside.
//!
//! Descriptors are plain data assembled when a pipeline is constructed. [`Capability`] binds a
//! descriptor back to its pipeline, so a router can dispatch requests without knowing the kind of
//! pipeline behind it.
use podbox_core::Hash;
use podbox_store::PodboxStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkin::{ActionConfig, CheckinRequest, CheckinResponse};
use crate::config::FeedOptions;
use crate::feed::{FeedError, FeedRequest, FeedResponse};
use crate::pipeline::AnyPipeline;
use crate::semaphore::{GroupInfo, SemaphoreError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityDescriptor {
    FeedIssuance(FeedOptions),
    Checkin,
    SemaphoreGroup,
}

pub enum Capability<'a, S> {
    FeedIssuance(FeedIssuance<'a, S>),
    Checkin(Checkin<'a, S>),
    SemaphoreGroup(SemaphoreGroups<'a, S>),
}

impl<'a, S> Capability<'a, S>
where
    S: PodboxStore,
{
    pub(crate) fn bind(descriptor: &'a CapabilityDescriptor, pipeline: &'a AnyPipeline<S>) -> Self {
        match descriptor {
            CapabilityDescriptor::FeedIssuance(options) => {
                Capability::FeedIssuance(FeedIssuance { options, pipeline })
            }
            CapabilityDescriptor::Checkin => Capability::Checkin(Checkin { pipeline }),
            CapabilityDescriptor::SemaphoreGroup => {
                Capability::SemaphoreGroup(SemaphoreGroups { pipeline })
            }
        }
    }

    pub fn descriptor(&self) -> CapabilityDescriptor {
        match self {
            Capability::FeedIssuance(feed) => {
                CapabilityDescriptor::FeedIssuance(feed.options.clone())
            }
            Capability::Checkin(_) => CapabilityDescriptor::Checkin,
            Capability::SemaphoreGroup(_) => CapabilityDescriptor::SemaphoreGroup,
        }
    }
}

pub struct FeedIssuance<'a, S> {
    options: &'a FeedOptions,
    pipeline: &'a AnyPipeline<S>,
}

impl<S> FeedIssuance<'_, S>
where
    S: PodboxStore,
{
    pub fn options(&self) -> &FeedOptions {
        self.options
    }

    pub async fn issue(&self, request: &FeedRequest) -> Result<FeedResponse, FeedError> {
        self.pipeline.issue(request).await
    }
}

pub struct Checkin<'a, S> {
    pipeline: &'a AnyPipeline<S>,
}

impl<S> Checkin<'_, S>
where
    S: PodboxStore,
{
    pub async fn pre_check(&self, request: &CheckinRequest) -> ActionConfig {
        self.pipeline.pre_check(request).await
    }

    pub async fn checkin(&self, request: &CheckinRequest) -> CheckinResponse {
        self.pipeline.checkin(request).await
    }
}

pub struct SemaphoreGroups<'a, S> {
    pipeline: &'a AnyPipeline<S>,
}

impl<S> SemaphoreGroups<'_, S>
where
    S: PodboxStore,
{
    pub fn supported_groups(&self) -> Vec<GroupInfo> {
        self.pipeline
            .ticketing()
            .map(|core| core.groups().supported_groups())
            .unwrap_or_default()
    }

    pub async fn group_root(&self, group_id: Uuid) -> Result<Option<Hash>, SemaphoreError> {
        match self.pipeline.ticketing() {
            Some(core) => core.groups().latest_group_root(group_id).await,
            None => Ok(None),
        }
    }

    pub async fn serialized_group(&self, group_id: Uuid) -> Result<Option<String>, SemaphoreError> {
        match self.pipeline.ticketing() {
            Some(core) => core.groups().serialized_latest_group(group_id).await,
            None => Ok(None),
        }
    }

    pub async fn serialized_historical_group(
        &self,
        group_id: Uuid,
        root_hash: &Hash,
    ) -> Result<Option<String>, SemaphoreError> {
        match self.pipeline.ticketing() {
            Some(core) => {
                core.groups()
                    .serialized_historical_group(group_id, root_hash)
                    .await
            }
            None => Ok(None),
        }
    }
}

