use gnfd_protocol::constants::{
    ACTION_CREATE_BUCKET, ACTION_CREATE_OBJECT, GET_APPROVAL_PATH, HEADER_PRE_SIGNATURE,
};
use gnfd_protocol::{check_bucket, check_object};
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::request::{RequestMeta, SendOptions};
use crate::signer::AuthInfo;
use crate::{Client, Error};

impl Client {
    /// Asks the SP to pre-approve creating `bucket`, or `bucket/object` when
    /// `object` is given.
    ///
    /// Returns the SP's signature from the `X-Gnfd-Pre-Signature` header.
    /// Any SP error, or a success without the header, is
    /// [`Error::ApprovalRejected`].
    pub async fn get_approval(
        &self,
        bucket: &str,
        object: Option<&str>,
        auth: &AuthInfo,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        check_bucket(bucket)?;
        if let Some(object) = object {
            check_object(object)?;
        }
        let action = match object {
            Some(_) => ACTION_CREATE_OBJECT,
            None => ACTION_CREATE_BUCKET,
        };

        let meta = RequestMeta {
            bucket: Some(bucket.to_string()),
            object: object.map(str::to_string),
            rel_path: Some(GET_APPROVAL_PATH.to_string()),
            action: Some(action.to_string()),
            ..Default::default()
        };

        let resp = match self
            .send_with_retry(meta, &SendOptions::admin(Method::GET), auth, cancel)
            .await
        {
            Ok(resp) => resp,
            Err(Error::Canceled) => return Err(Error::Canceled),
            Err(e) => {
                let response = e.response().cloned().map(Box::new);
                return Err(Error::ApprovalRejected {
                    reason: e.to_string(),
                    response,
                });
            }
        };

        let signature = resp
            .headers()
            .get(HEADER_PRE_SIGNATURE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if signature.is_empty() {
            return Err(Error::ApprovalRejected {
                reason: format!("response carried no {HEADER_PRE_SIGNATURE} header"),
                response: None,
            });
        }

        info!(bucket, ?object, action, "received SP approval");
        Ok(signature.to_string())
    }
}
