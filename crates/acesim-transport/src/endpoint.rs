use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::pty::{PtyController, PtyPair};

/// The emulated serial device as host software sees it.
///
/// Owns both sides of a pseudo-terminal pair and a symlink at a well-known
/// path pointing at the consumer side. Holding the consumer descriptor keeps
/// the controller from seeing a hangup while no client is attached.
///
/// Teardown unlinks the discovery path, deregisters the controller from the
/// reactor, and closes both descriptors. [`close`](Self::close) reports
/// failures; `Drop` performs the same teardown best-effort.
#[derive(Debug)]
pub struct VirtualSerialEndpoint {
    controller: PtyController,
    _consumer: OwnedFd,
    consumer_path: PathBuf,
    link_path: PathBuf,
    linked: bool,
}

impl VirtualSerialEndpoint {
    /// Create a pseudo-terminal pair and publish it at `link_path`.
    ///
    /// A stale symlink left at `link_path` by a previous instance is removed
    /// first. Any other kind of file at that path is never touched.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(link_path: impl AsRef<Path>) -> Result<Self> {
        let link_path = link_path.as_ref().to_path_buf();

        remove_stale_link(&link_path)?;

        let pair = PtyPair::open()?;
        let consumer_path = pair.consumer_path()?;
        let (controller, consumer) = pair.into_parts();
        let controller = PtyController::new(controller)?;

        std::os::unix::fs::symlink(&consumer_path, &link_path).map_err(|source| {
            TransportError::Link {
                path: link_path.clone(),
                target: consumer_path.clone(),
                source,
            }
        })?;

        info!(path = ?link_path, device = ?consumer_path, "virtual serial endpoint ready");

        Ok(Self {
            controller,
            _consumer: consumer,
            consumer_path,
            link_path,
            linked: true,
        })
    }

    /// The discovery path clients open.
    pub fn path(&self) -> &Path {
        &self.link_path
    }

    /// Real path of the consumer side the discovery path points at.
    pub fn consumer_path(&self) -> &Path {
        &self.consumer_path
    }

    /// Async byte I/O on the controller side.
    pub fn controller_mut(&mut self) -> &mut PtyController {
        &mut self.controller
    }

    /// Tear the endpoint down, reporting a failure to remove the discovery path.
    pub fn close(mut self) -> Result<()> {
        let result = self.unlink();
        debug!(path = ?self.link_path, "virtual serial endpoint closed");
        result
    }

    fn unlink(&mut self) -> Result<()> {
        if !self.linked {
            return Ok(());
        }
        self.linked = false;

        match std::fs::read_link(&self.link_path) {
            Ok(target) if target == self.consumer_path => {
                std::fs::remove_file(&self.link_path).map_err(|source| TransportError::Unlink {
                    path: self.link_path.clone(),
                    source,
                })
            }
            Ok(target) => {
                debug!(
                    path = ?self.link_path,
                    ?target,
                    "discovery path replaced; skipping unlink"
                );
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                debug!(
                    path = ?self.link_path,
                    error = %err,
                    "discovery path not a link; skipping unlink"
                );
                Ok(())
            }
        }
    }
}

impl Drop for VirtualSerialEndpoint {
    fn drop(&mut self) {
        if let Err(err) = self.unlink() {
            warn!(error = %err, "failed to remove discovery path during drop");
        }
    }
}

fn remove_stale_link(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(TransportError::StalePath {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.file_type().is_symlink() {
        return Err(TransportError::NotALink {
            path: path.to_path_buf(),
        });
    }

    debug!(?path, "removing stale discovery link");
    std::fs::remove_file(path).map_err(|source| TransportError::StalePath {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::{Read, Write};
    use std::os::unix::fs::OpenOptionsExt;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "acesim-endpoint-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    fn open_client(path: &Path) -> std::fs::File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .expect("client should open the discovery path")
    }

    #[tokio::test]
    async fn create_publishes_link_and_close_removes_it() {
        let dir = unique_temp_dir("lifecycle");
        let link = dir.join("KobraACESimulator");

        let endpoint = VirtualSerialEndpoint::create(&link).unwrap();
        assert_eq!(endpoint.path(), link.as_path());
        assert_eq!(std::fs::read_link(&link).unwrap(), endpoint.consumer_path());
        assert!(std::fs::metadata(&link).is_ok(), "link should resolve");

        endpoint.close().unwrap();
        assert!(std::fs::symlink_metadata(&link).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn client_traffic_flows_through_link() {
        let dir = unique_temp_dir("traffic");
        let link = dir.join("device");
        let mut endpoint = VirtualSerialEndpoint::create(&link).unwrap();
        let mut client = open_client(&link);

        client.write_all(&[0xFF, 0xAA, 0x00, 0x00]).unwrap();
        let mut buf = [0u8; 4];
        endpoint.controller_mut().read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xFF, 0xAA, 0x00, 0x00]);

        endpoint.controller_mut().write_all(b"ack").await.unwrap();
        let mut reply = [0u8; 3];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"ack");

        drop(client);
        endpoint.close().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn stale_link_is_replaced() {
        let dir = unique_temp_dir("stale");
        let link = dir.join("device");
        std::os::unix::fs::symlink("/dev/pts/does-not-exist", &link).unwrap();

        let endpoint = VirtualSerialEndpoint::create(&link).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), endpoint.consumer_path());

        endpoint.close().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn refuses_to_replace_regular_file() {
        let dir = unique_temp_dir("regular");
        let link = dir.join("device");
        std::fs::write(&link, b"not a link").unwrap();

        let result = VirtualSerialEndpoint::create(&link);
        assert!(matches!(result, Err(TransportError::NotALink { .. })));
        assert_eq!(std::fs::read(&link).unwrap(), b"not a link");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_runtime_dir_fails_to_link() {
        let dir = unique_temp_dir("missing");
        let link = dir.join("absent").join("device");

        let result = VirtualSerialEndpoint::create(&link);
        assert!(matches!(result, Err(TransportError::Link { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn drop_removes_link() {
        let dir = unique_temp_dir("drop");
        let link = dir.join("device");

        let endpoint = VirtualSerialEndpoint::create(&link).unwrap();
        drop(endpoint);
        assert!(std::fs::symlink_metadata(&link).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn drop_does_not_remove_replaced_link() {
        let dir = unique_temp_dir("replaced");
        let link = dir.join("device");

        let endpoint = VirtualSerialEndpoint::create(&link).unwrap();
        std::fs::remove_file(&link).unwrap();
        std::os::unix::fs::symlink("/dev/null", &link).unwrap();

        drop(endpoint);
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("/dev/null"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn client_sees_hangup_after_close() {
        let dir = unique_temp_dir("hangup");
        let link = dir.join("device");
        let endpoint = VirtualSerialEndpoint::create(&link).unwrap();
        let mut client = open_client(&link);

        endpoint.close().unwrap();

        let mut buf = [0u8; 1];
        match client.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(err) => assert_eq!(err.raw_os_error(), Some(libc::EIO)),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
