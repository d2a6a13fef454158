// Copyright (c) 2025 - Cowboy AI, Inc.

//! Derived identifier construction
//!
//! All stable identifiers are namespace hashes so that re-ingesting the same
//! logical artifact lands on the same row:
//!
//! - `file_id = uuid5(DNS, "{tenant_id}:{uri}")`
//! - `resource_id = uuid5(DNS, "{file_id}:chunk:{ordinal}")`
//! - `embedding_id = uuid5(DNS, "{entity_id}:{field}:{provider}")`
//! - `tenant_id = "tenant-" + hex(sha256(email))[..12]`
//! - `device_id = hex(sha256(email|name|type|platform|pk_prefix))[..16]`

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stable file identifier for a `(tenant, uri)` pair
pub fn file_id(tenant_id: &str, uri: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_DNS,
        format!("{tenant_id}:{uri}").as_bytes(),
    )
}

/// Stable resource identifier for chunk `ordinal` of a file
pub fn resource_id(file_id: &Uuid, ordinal: u32) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_DNS,
        format!("{file_id}:chunk:{ordinal}").as_bytes(),
    )
}

/// Stable sidecar embedding identifier for an `(entity, field, provider)` triple
pub fn embedding_id(entity_id: &str, field: &str, provider: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_DNS,
        format!("{entity_id}:{field}:{provider}").as_bytes(),
    )
}

/// Tenant identifier derived from an email address
pub fn derived_tenant_id(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_ascii_lowercase().as_bytes());
    format!("tenant-{}", hex_prefix(&digest, 12))
}

/// Device identifier derived from enrollment attributes.
///
/// Only a prefix of the public key participates so that re-registration with
/// the same device attributes resolves to the same device.
pub fn derived_device_id(
    email: &str,
    device_name: &str,
    device_type: &str,
    platform: &str,
    public_key_base64: &str,
) -> String {
    let pk_prefix: String = public_key_base64.chars().take(16).collect();
    let digest = Sha256::digest(
        format!("{email}|{device_name}|{device_type}|{platform}|{pk_prefix}").as_bytes(),
    );
    hex_prefix(&digest, 16)
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_is_stable() {
        let a = file_id("t1", "/buckets/t1/docs/report.pdf");
        let b = file_id("t1", "/buckets/t1/docs/report.pdf");
        assert_eq!(a, b);
        assert_ne!(a, file_id("t2", "/buckets/t1/docs/report.pdf"));
    }

    #[test]
    fn test_resource_ids_vary_by_ordinal() {
        let fid = file_id("t1", "/buckets/t1/docs/report.pdf");
        assert_ne!(resource_id(&fid, 0), resource_id(&fid, 1));
        assert_eq!(resource_id(&fid, 3), resource_id(&fid, 3));
    }

    #[test]
    fn test_tenant_id_shape() {
        let tid = derived_tenant_id("user@example.com");
        assert!(tid.starts_with("tenant-"));
        assert_eq!(tid.len(), "tenant-".len() + 12);
        // Case and whitespace insensitive
        assert_eq!(tid, derived_tenant_id("  USER@example.com "));
    }

    #[test]
    fn test_device_id_shape() {
        let did = derived_device_id("a@b.c", "Pixel", "phone", "android", "AAAA1111BBBB2222cccc");
        assert_eq!(did.len(), 16);
        assert!(did.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
