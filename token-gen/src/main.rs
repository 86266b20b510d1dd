use std::{fs, path::PathBuf, str::FromStr};

use clap::Parser;
use endpoint_guard::services::authn::Signer;
use jsonwebtoken::Algorithm;
use serde_json::{Map, Value, json};

/// Generate a signed JWT (JWS compact serialization) for calling a guarded endpoint.
///
/// - Header: alg = --method, kid = --kid
/// - Claims: sub, iat, exp (= iat + ttl), plus iss/aud and any --claims object
/// - The kid must match a key the verifier resolves (JWKS or static key)
#[derive(Parser, Debug)]
#[command(name = "token-gen", version, about)]
struct Args {
    /// Key id placed in the JWS header
    #[arg(long)]
    kid: String,

    /// Path to the private key in PEM (RSA PKCS#1/PKCS#8, EC or Ed PKCS#8).
    /// For HS* methods the file content is the shared secret.
    #[arg(long, value_name = "FILE")]
    private_pem: PathBuf,

    /// Signing method, e.g. RS256, PS256, ES256, EdDSA, HS256
    #[arg(long, default_value = "RS256")]
    method: String,

    #[arg(long)]
    sub: String,

    #[arg(long)]
    iss: Option<String>,

    #[arg(long)]
    aud: Option<String>,

    /// Lifetime in seconds. Negative values mint an already-expired token.
    #[arg(long, default_value_t = 300, allow_hyphen_values = true)]
    ttl: i64,

    /// Override iat (unix seconds). Default: now.
    #[arg(long)]
    iat: Option<i64>,

    /// Extra claims as a JSON object, merged over the generated ones
    #[arg(long, value_name = "JSON")]
    claims: Option<String>,
}

fn build_claims(args: &Args, now: i64) -> Result<Value, Box<dyn std::error::Error>> {
    let iat = args.iat.unwrap_or(now);

    let mut claims = Map::new();
    claims.insert("sub".into(), json!(args.sub));
    claims.insert("iat".into(), json!(iat));
    claims.insert("exp".into(), json!(iat + args.ttl));
    if let Some(iss) = &args.iss {
        claims.insert("iss".into(), json!(iss));
    }
    if let Some(aud) = &args.aud {
        claims.insert("aud".into(), json!(aud));
    }

    if let Some(extra) = &args.claims {
        let Value::Object(extra) = serde_json::from_str::<Value>(extra)? else {
            return Err("--claims must be a JSON object".into());
        };
        claims.extend(extra);
    }

    Ok(Value::Object(claims))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let method = Algorithm::from_str(&args.method)?;
    let pem = fs::read_to_string(&args.private_pem)?;
    let signer = Signer::from_pem(args.kid.as_str(), &pem, method)?;

    let claims = build_claims(&args, chrono::Utc::now().timestamp())?;
    println!("{}", signer.sign(&claims)?);

    Ok(())
}
