//! API tokens stored in Kubernetes secrets

use async_trait::async_trait;
use hcloud_api::v1beta1::HetznerSecretRef;
use hcloud_core::{ApiToken, CredentialError, CredentialSource};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tracing::debug;

/// Reads the token from the secret in the cluster's namespace on every pass,
/// so a rotated or fixed secret is picked up without a restart.
#[derive(Clone)]
pub struct KubeSecretCredentials {
    client: Client,
}

impl KubeSecretCredentials {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Extract the token referenced by `reference` from a fetched secret
pub fn token_from_secret(secret: &Secret, reference: &HetznerSecretRef) -> Result<ApiToken, CredentialError> {
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(&reference.key))
        .ok_or_else(|| CredentialError::MissingKey {
            secret: reference.name.clone(),
            key: reference.key.clone(),
        })?;

    match std::str::from_utf8(&value.0).map(str::trim) {
        Ok(token) if !token.is_empty() => Ok(ApiToken::new(token)),
        _ => Err(CredentialError::EmptyValue {
            secret: reference.name.clone(),
            key: reference.key.clone(),
        }),
    }
}

#[async_trait]
impl CredentialSource for KubeSecretCredentials {
    async fn resolve(&self, namespace: &str, secret: &HetznerSecretRef) -> Result<ApiToken, CredentialError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let found = api
            .get_opt(&secret.name)
            .await
            .map_err(|e| CredentialError::Unreachable {
                secret: secret.name.clone(),
                message: e.to_string(),
            })?;

        match found {
            Some(object) => token_from_secret(&object, secret),
            None => {
                debug!("Secret {}/{} does not exist", namespace, secret.name);
                Err(CredentialError::NotFound(secret.name.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn secret_with(key: &str, value: &[u8]) -> Secret {
        Secret {
            data: Some(BTreeMap::from([(key.to_string(), ByteString(value.to_vec()))])),
            ..Default::default()
        }
    }

    fn reference() -> HetznerSecretRef {
        HetznerSecretRef {
            name: "hetzner".into(),
            key: "hcloud".into(),
        }
    }

    #[test]
    fn test_token_is_trimmed() {
        let token = token_from_secret(&secret_with("hcloud", b"abc123\n"), &reference()).unwrap();
        assert_eq!(token.expose(), "abc123");
    }

    #[test]
    fn test_missing_key() {
        let err = token_from_secret(&secret_with("other", b"abc"), &reference()).unwrap_err();
        assert!(matches!(err, CredentialError::MissingKey { .. }));

        let err = token_from_secret(&Secret::default(), &reference()).unwrap_err();
        assert!(matches!(err, CredentialError::MissingKey { .. }));
    }

    #[test]
    fn test_empty_or_unreadable_value() {
        let values: [&[u8]; 3] = [b"", b"   ", &[0xff, 0xfe]];
        for value in values {
            let err = token_from_secret(&secret_with("hcloud", value), &reference()).unwrap_err();
            assert!(matches!(err, CredentialError::EmptyValue { .. }));
        }
    }
}
