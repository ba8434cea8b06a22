//! # Requests and Operation Descriptors
//!
//! A [`Request`] is the unit of work handed to every entry point of
//! [`DataManager`](crate::manager::DataManager). It names the logical owner of a
//! data container, the instance number, the two ends of a transfer, and an
//! [`Operations`] descriptor.
//!
//! [`Operations`] doubles as the stored data-container definition produced by
//! the [`definitions`](crate::definitions) loader. Every scalar field is
//! optional so that "not specified" survives a shallow [`Operations::overlay`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Distinguishes data containers from the containers they back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Data,
    Service,
    Chain,
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ContainerType::Data => "data",
            ContainerType::Service => "service",
            ContainerType::Chain => "chain",
        };
        f.write_str(tag)
    }
}

/// Descriptor bundle for a data container and the commands run against it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Operations {
    /// Instance number of the container this descriptor targets
    pub container_number: Option<u32>,
    /// Kind of container
    pub container_type: Option<ContainerType>,
    /// Canonical data container name, always derived by the crate
    pub data_container_name: Option<String>,
    /// Argument vector for runs inside the container
    pub args: Vec<String>,
    /// Image the container is created from and auxiliary runs use
    pub image: Option<String>,
    /// User to run as
    pub user: Option<String>,
    /// Environment entries in `KEY=VALUE` form
    pub env: Vec<String>,
    /// Labels attached at creation
    pub labels: BTreeMap<String, String>,
    /// Attach stdin and a terminal to runs
    pub interactive: Option<bool>,
}

impl Operations {
    /// Overlay `overrides` onto `self`.
    ///
    /// This is a shallow merge: every field that is set in `overrides` (a
    /// `Some`, or a non-empty collection) replaces the field in `self`
    /// wholesale. Unset fields keep the value already in `self`.
    pub fn overlay(&mut self, overrides: &Operations) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        take(&mut self.container_number, &overrides.container_number);
        take(&mut self.container_type, &overrides.container_type);
        take(&mut self.data_container_name, &overrides.data_container_name);
        take(&mut self.image, &overrides.image);
        take(&mut self.user, &overrides.user);
        take(&mut self.interactive, &overrides.interactive);

        if !overrides.args.is_empty() {
            self.args.clone_from(&overrides.args);
        }
        if !overrides.env.is_empty() {
            self.env.clone_from(&overrides.env);
        }
        if !overrides.labels.is_empty() {
            self.labels.clone_from(&overrides.labels);
        }
    }

    /// Whether runs should attach stdin and a terminal
    pub fn is_interactive(&self) -> bool {
        self.interactive.unwrap_or(false)
    }
}

/// Marker left in [`Request::result`] by a successful call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
}

/// The unit of work passed to import, export and exec
#[derive(Debug, Clone)]
pub struct Request {
    /// Logical name of the service or chain owning the data container
    pub name: String,
    /// Which of the data containers for `name` to target
    pub instance_number: u32,
    /// Import: host directory. Export: path inside the container.
    pub source: PathBuf,
    /// Import: path inside the container. Export: host directory.
    pub destination: PathBuf,
    /// Caller-supplied operation overrides
    pub operations: Operations,
    /// Set to `Some(Outcome::Success)` once the call has succeeded
    pub result: Option<Outcome>,
}

impl Request {
    /// Create a request for instance 1 of `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_number: 1,
            source: PathBuf::new(),
            destination: PathBuf::new(),
            operations: Operations::default(),
            result: None,
        }
    }

    /// Target a specific instance
    pub fn with_instance(mut self, instance_number: u32) -> Self {
        self.instance_number = instance_number;
        self
    }

    /// Set both transfer endpoints
    pub fn with_paths(mut self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self.destination = destination.into();
        self
    }

    /// Set the operation overrides
    pub fn with_operations(mut self, operations: Operations) -> Self {
        self.operations = operations;
        self
    }

    /// Whether the call that consumed this request succeeded
    pub fn succeeded(&self) -> bool {
        self.result == Some(Outcome::Success)
    }
}
