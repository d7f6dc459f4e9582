//! Builders for test objects.

#![allow(dead_code)]

use std::collections::BTreeMap;

use flate2::write::GzEncoder;
use flate2::Compression;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;

use yttsource::api::{YttSource, YttSourceSpec};
use yttsource::source::{DEFAULT_SECRET_TYPE, PAYLOAD_KEY};

/// Builds a gzip-compressed tarball of `(path, content)` pairs.
pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Builds a tarball whose single entry has a raw, unchecked name.
pub fn tarball_with_raw_entry(name: &str, content: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, content.as_bytes()).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

/// Builder for `YttSource` objects.
pub struct YttSourceBuilder {
    namespace: String,
    name: String,
    spec: YttSourceSpec,
    deleting: bool,
}

impl YttSourceBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            spec: YttSourceSpec::default(),
            deleting: false,
        }
    }

    pub fn reference(mut self, kind: &str, name: &str) -> Self {
        self.spec.kind = kind.to_string();
        self.spec.name = name.to_string();
        self
    }

    pub fn reference_namespace(mut self, namespace: &str) -> Self {
        self.spec.namespace = namespace.to_string();
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.spec.path = path.to_string();
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn build(self) -> YttSource {
        let mut source = YttSource::new(&self.name, self.spec);
        source.metadata.namespace = Some(self.namespace);
        source.metadata.resource_version = Some("1".to_string());
        if self.deleting {
            source.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
            source.metadata.finalizers = Some(vec!["example.com/hold".to_string()]);
        }
        source
    }
}

/// A ConfigMap carrying `payload` under the payload key.
pub fn payload_config_map(namespace: &str, name: &str, payload: Vec<u8>) -> ConfigMap {
    let mut cm = ConfigMap::default();
    cm.metadata.name = Some(name.to_string());
    cm.metadata.namespace = Some(namespace.to_string());
    cm.binary_data = Some(BTreeMap::from([(
        PAYLOAD_KEY.to_string(),
        ByteString(payload),
    )]));
    cm
}

/// A Secret of the accepted type carrying `payload`.
pub fn payload_secret(namespace: &str, name: &str, payload: Vec<u8>) -> Secret {
    typed_secret(namespace, name, DEFAULT_SECRET_TYPE, payload)
}

pub fn typed_secret(namespace: &str, name: &str, type_: &str, payload: Vec<u8>) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(namespace.to_string());
    secret.type_ = Some(type_.to_string());
    secret.data = Some(BTreeMap::from([(
        PAYLOAD_KEY.to_string(),
        ByteString(payload),
    )]));
    secret
}
