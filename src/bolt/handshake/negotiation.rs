//! Client side of the Bolt handshake.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{BoltVersion, HandshakeError, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE, HANDSHAKE_SIZE};
use crate::bolt::error::BoltResult;

/// A version proposal: newest acceptable version plus how many older
/// minors of the same major are also acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProposal {
    /// Newest version of the range
    pub version: BoltVersion,
    /// Number of older minor versions included
    pub range: u8,
}

impl VersionProposal {
    /// Proposal for a single version.
    pub const fn exact(version: BoltVersion) -> Self {
        Self { version, range: 0 }
    }

    /// Proposal for `version` and `range` older minors.
    pub const fn range(version: BoltVersion, range: u8) -> Self {
        Self { version, range }
    }

    /// Whether `version` falls inside this proposal.
    pub fn accepts(&self, version: BoltVersion) -> bool {
        version.major() == self.version.major()
            && version.minor() <= self.version.minor()
            && version.minor() + self.range >= self.version.minor()
    }
}

/// Default proposals, newest first: 5.4-5.0, 4.4-4.0, 3.0.
pub const DEFAULT_PROPOSALS: [VersionProposal; 3] = [
    VersionProposal::range(BoltVersion::V5_4, 4),
    VersionProposal::range(BoltVersion::V4_4, 4),
    VersionProposal::exact(BoltVersion::V3_0),
];

/// Build the 20-byte client handshake: magic plus four proposal slots.
/// Unused slots are zero.
pub fn build_client_handshake(proposals: &[VersionProposal]) -> [u8; HANDSHAKE_SIZE] {
    let mut data = [0u8; HANDSHAKE_SIZE];
    data[0..4].copy_from_slice(&BOLT_MAGIC);

    for (i, proposal) in proposals.iter().take(4).enumerate() {
        let offset = 4 + (i * 4);
        data[offset..offset + 4].copy_from_slice(&proposal.version.proposal(proposal.range));
    }

    data
}

/// Interpret the server's 4-byte reply against what was proposed.
pub fn parse_server_response(
    reply: [u8; HANDSHAKE_RESPONSE_SIZE],
    proposals: &[VersionProposal],
) -> Result<BoltVersion, HandshakeError> {
    if reply == [0, 0, 0, 0] {
        return Err(HandshakeError::NoCompatibleVersion);
    }
    if &reply == b"HTTP" {
        return Err(HandshakeError::InvalidData(
            "server answered with HTTP; is the port a Bolt port?".into(),
        ));
    }

    let version = BoltVersion::from_bytes(reply)
        .ok_or_else(|| HandshakeError::UnsupportedVersion(u32::from_be_bytes(reply)))?;

    if proposals.iter().any(|p| p.accepts(version)) {
        Ok(version)
    } else {
        Err(HandshakeError::UnsupportedVersion(u32::from_be_bytes(reply)))
    }
}

/// Run the handshake over a freshly opened stream.
pub async fn perform<S>(stream: &mut S, proposals: &[VersionProposal]) -> BoltResult<BoltVersion>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(&build_client_handshake(proposals)).await?;
    stream.flush().await?;

    let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
    match stream.read_exact(&mut reply).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(HandshakeError::ConnectionClosed.into());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(parse_server_response(reply, proposals)?)
}
