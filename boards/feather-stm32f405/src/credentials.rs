//! Transport security material, embedded at build time (see `certs/README.md`)

use hal_abstractions::Credentials;

pub const CREDENTIALS: Credentials<'static> = Credentials {
    trust_anchor: include_bytes!("../certs/ca.der"),
    client_cert: include_bytes!("../certs/client.der"),
    client_key: include_bytes!("../certs/client-key.der"),
};
