use super::attributes::{
    AUTHZID_KEY, GS2_CHANNEL_BINDING_REQUIRED, GS2_CHANNEL_BINDING_UNUSED, GS2_NO_CHANNEL_BINDING,
    NONCE_KEY, RESERVED_MEXT, USERNAME_KEY,
};
use crate::Error;

/// The client-first message
///
/// ```text
/// gs2-cbind-flag "," [ "a=" saslname ] "," "n=" saslname "," "r=" nonce [ "," extensions ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFirstMessage {
    gs2_cbind_flag: String,
    authorization_id: Option<String>,
    sasl_name: String,
    username: String,
    nonce: String,
    extensions: Vec<String>,
}

impl ClientFirstMessage {
    /// Parses a client-first message.
    ///
    /// A non-empty authorization id must name the same user as the username.
    pub fn parse(message: &[u8]) -> Result<Self, Error> {
        let message = std::str::from_utf8(message)
            .map_err(|_| Error::malformed("SCRAM client-first message is not valid UTF-8"))?;

        let (gs2_cbind_flag, rest) = message
            .split_once(',')
            .ok_or_else(|| Error::malformed("SCRAM client-first message has no GS2 header"))?;
        match gs2_cbind_flag {
            GS2_NO_CHANNEL_BINDING | GS2_CHANNEL_BINDING_UNUSED => {}
            flag if flag.starts_with(GS2_CHANNEL_BINDING_REQUIRED) => {
                return Err(Error::malformed("SCRAM channel binding is not supported"))
            }
            _ => return Err(Error::malformed("Invalid SCRAM channel binding flag")),
        }

        let (authzid, bare) = rest
            .split_once(',')
            .ok_or_else(|| Error::malformed("SCRAM client-first message has no GS2 header"))?;
        let authorization_id = match authzid {
            "" => None,
            authzid => {
                let sasl_name = authzid
                    .strip_prefix(AUTHZID_KEY)
                    .ok_or_else(|| Error::malformed("Invalid SCRAM authorization id"))?;
                Some(decode_sasl_name(sasl_name)?).filter(|name| !name.is_empty())
            }
        };

        let mut attributes = bare.split(',');
        let first = attributes.next().unwrap_or_default();
        if first.starts_with(RESERVED_MEXT) {
            return Err(Error::malformed("SCRAM mandatory extensions are not supported"));
        }
        let sasl_name = first
            .strip_prefix(USERNAME_KEY)
            .ok_or_else(|| Error::malformed("SCRAM client-first message has no username"))?;
        if sasl_name.is_empty() {
            return Err(Error::EmptyIdentity);
        }
        let username = decode_sasl_name(sasl_name)?;

        let nonce = attributes
            .next()
            .and_then(|attr| attr.strip_prefix(NONCE_KEY))
            .filter(|nonce| !nonce.is_empty() && nonce.bytes().all(|b| (0x21..=0x7e).contains(&b)))
            .ok_or_else(|| Error::malformed("SCRAM client-first message has no valid nonce"))?;

        let extensions = attributes.map(String::from).collect();

        if let Some(authorization_id) = &authorization_id {
            if *authorization_id != username {
                return Err(Error::ImpersonationNotSupported);
            }
        }

        Ok(Self {
            gs2_cbind_flag: gs2_cbind_flag.to_string(),
            authorization_id,
            sasl_name: sasl_name.to_string(),
            username,
            nonce: nonce.to_string(),
            extensions,
        })
    }

    /// Channel binding flag of the GS2 header
    pub fn gs2_cbind_flag(&self) -> &str {
        &self.gs2_cbind_flag
    }

    /// Decoded authorization id, if one was given
    pub fn authorization_id(&self) -> Option<&str> {
        self.authorization_id.as_deref()
    }

    /// The username as it appears on the wire
    pub fn sasl_name(&self) -> &str {
        &self.sasl_name
    }

    /// The decoded username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Client nonce
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Optional extensions, verbatim
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// Reverses the `=2C` / `=3D` escaping of a saslname
fn decode_sasl_name(sasl_name: &str) -> Result<String, Error> {
    let mut decoded = String::with_capacity(sasl_name.len());
    let mut rest = sasl_name;
    while let Some(pos) = rest.find('=') {
        decoded.push_str(&rest[..pos]);
        let escaped = rest.get(pos + 1..pos + 3);
        match escaped {
            Some("2C") => decoded.push(','),
            Some("3D") => decoded.push('='),
            _ => {
                let offset = sasl_name.len() - rest.len() + pos;
                return Err(Error::malformed(format!(
                    "Invalid escape in SCRAM saslname at offset {}",
                    offset
                )));
            }
        }
        rest = &rest[pos + 3..];
    }
    decoded.push_str(rest);
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::ClientFirstMessage;
    use crate::Error;

    #[test]
    fn rfc_7677_client_first() {
        let message = ClientFirstMessage::parse(b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO").unwrap();
        assert_eq!(message.gs2_cbind_flag(), "n");
        assert_eq!(message.authorization_id(), None);
        assert_eq!(message.sasl_name(), "user");
        assert_eq!(message.username(), "user");
        assert_eq!(message.nonce(), "rOprNGfwEbeRWgbNEkqO");
        assert!(message.extensions().is_empty());
    }

    #[test]
    fn escaped_names_are_decoded() {
        let message =
            ClientFirstMessage::parse(b"n,a=us=2Cer=3D,n=us=2Cer=3D,r=abc,x=ext").unwrap();
        assert_eq!(message.sasl_name(), "us=2Cer=3D");
        assert_eq!(message.username(), "us,er=");
        assert_eq!(message.authorization_id(), Some("us,er="));
        assert_eq!(message.extensions(), ["x=ext"]);
    }

    #[test]
    fn bad_escape_is_malformed() {
        for message in [&b"n,,n=us=2Xer,r=abc"[..], b"n,,n=user=,r=abc", b"n,,n=user=3,r=abc"] {
            assert!(matches!(
                ClientFirstMessage::parse(message),
                Err(Error::MalformedRequest(_))
            ));
        }
    }

    #[test]
    fn impersonation_is_rejected() {
        assert!(matches!(
            ClientFirstMessage::parse(b"n,a=admin,n=user,r=abc"),
            Err(Error::ImpersonationNotSupported)
        ));
    }

    #[test]
    fn empty_authorization_id_is_ignored() {
        let message = ClientFirstMessage::parse(b"y,a=,n=user,r=abc").unwrap();
        assert_eq!(message.authorization_id(), None);
    }

    #[test]
    fn channel_binding_and_mandatory_extensions_are_rejected() {
        for message in [
            &b"p=tls-unique,,n=user,r=abc"[..],
            b"q,,n=user,r=abc",
            b"n,,m=ext,n=user,r=abc",
            b"n,,n=user",
            b"n,,n=user,r=",
            b"n,,r=abc,n=user",
            b"n",
        ] {
            assert!(
                matches!(
                    ClientFirstMessage::parse(message),
                    Err(Error::MalformedRequest(_))
                ),
                "{:?}",
                String::from_utf8_lossy(message)
            );
        }
    }

    #[test]
    fn empty_username_is_rejected() {
        assert!(matches!(
            ClientFirstMessage::parse(b"n,,n=,r=abc"),
            Err(Error::EmptyIdentity)
        ));
    }
}
