use rusqlite::{params, Connection, OptionalExtension};
use sha3::{Digest, Keccak384};

use crate::PersistError;

/// Account privilege ladder. Ordered so `level >= AccountLevel::Moderator`
/// reads naturally at call sites, mirroring the reference's
/// `AuthAccount::AccountLevel` enum used the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccountLevel {
    Invalid = 0,
    Registered = 5,
    Moderator = 10,
    ServerAdmin = 42,
}

impl AccountLevel {
    fn from_raw(v: i64) -> Self {
        match v {
            v if v >= AccountLevel::ServerAdmin as i64 => AccountLevel::ServerAdmin,
            v if v >= AccountLevel::Moderator as i64 => AccountLevel::Moderator,
            v if v >= AccountLevel::Registered as i64 => AccountLevel::Registered,
            _ => AccountLevel::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub name: String,
    pub email: String,
    /// Hex-encoded Keccak-384 digest; never the plaintext password.
    pub password: String,
    pub password_reset: String,
    pub last_login: i64,
    pub resend_retry: i64,
    pub ban_expiry: i64,
    pub level: AccountLevel,
}

impl Account {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_plaintext: &str) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: hash_password(password_plaintext),
            password_reset: String::new(),
            last_login: 0,
            resend_retry: 0,
            ban_expiry: 0,
            level: AccountLevel::Registered,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BanEntry {
    pub affected: String,
    pub context: String,
    pub expiry: i64,
    pub comment: String,
}

/// Hashes a plaintext password with Keccak-384, per the reference's choice
/// of SHA3/Keccak over bcrypt/argon2 (no work factor, no salt beyond what
/// the account record itself provides) — preserved rather than upgraded,
/// since changing the hash scheme would break every stored password.
pub fn hash_password(plaintext: &str) -> String {
    let mut hasher = Keccak384::new();
    hasher.update(plaintext.as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Computes the client side of the §4.9 challenge/response: `SHA3-384(pw_hash || random)`,
/// where `pw_hash` is the account's stored Keccak-384 digest (decoded from its hex
/// form back to raw bytes) and `random` is the server-issued challenge. The server
/// recomputes this the same way from the stored hash to verify a login attempt.
pub fn challenge_response(password_hash_hex: &str, challenge: &[u8]) -> Vec<u8> {
    let mut hasher = Keccak384::new();
    match from_hex(password_hash_hex) {
        Some(bytes) => hasher.update(&bytes),
        None => hasher.update(password_hash_hex.as_bytes()),
    }
    hasher.update(challenge);
    hasher.finalize().to_vec()
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// SQLite-backed account store: `auth` (one row per account), `log`
/// (moderation/admin action trail), `bans` (affected+context keyed,
/// also reused by the server as a short-lived rate-limit record — see
/// `bw-server`'s `/save` throttling), and `config` (small server-wide
/// key/value settings).
pub struct AuthStore {
    conn: Connection,
}

impl AuthStore {
    pub fn open(path: &str) -> Result<Self, PersistError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS auth (
                name           TEXT UNIQUE,
                email          TEXT,
                password       TEXT,
                password_reset TEXT,
                last_login     INTEGER,
                resend_retry   INTEGER,
                ban_expiry     INTEGER,
                level          INTEGER,
                PRIMARY KEY(name)
            );
            CREATE TABLE IF NOT EXISTS log (
                timestamp INTEGER,
                action    TEXT,
                text      TEXT
            );
            CREATE TABLE IF NOT EXISTS bans (
                affected TEXT,
                context  TEXT,
                expiry   INTEGER,
                comment  TEXT,
                PRIMARY KEY(affected, context)
            );
            CREATE TABLE IF NOT EXISTS config (
                key   TEXT UNIQUE,
                value TEXT,
                PRIMARY KEY(key)
            );",
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, PersistError> {
        Self::open(":memory:")
    }

    /// Looks an account up by name OR email, matching the reference's
    /// single `WHERE name = ? OR email = ?` lookup (a user may log in
    /// with either).
    pub fn load(&self, name_or_email: &str) -> Result<Option<Account>, PersistError> {
        self.conn
            .query_row(
                "SELECT name, email, password, password_reset, last_login, resend_retry, ban_expiry, level
                 FROM auth WHERE name = ?1 OR email = ?1 LIMIT 1",
                params![name_or_email],
                |row| {
                    Ok(Account {
                        name: row.get(0)?,
                        email: row.get(1)?,
                        password: row.get(2)?,
                        password_reset: row.get(3)?,
                        last_login: row.get(4)?,
                        resend_retry: row.get(5)?,
                        ban_expiry: row.get(6)?,
                        level: AccountLevel::from_raw(row.get(7)?),
                    })
                },
            )
            .optional()
            .map_err(PersistError::from)
    }

    pub fn save(&mut self, account: &Account) -> Result<(), PersistError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "REPLACE INTO auth
             (name, email, password, password_reset, last_login, resend_retry, ban_expiry, level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                account.name,
                account.email,
                account.password,
                account.password_reset,
                account.last_login,
                account.resend_retry,
                account.ban_expiry,
                account.level as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Sets `password_reset` and bumps `resend_retry` to now, in one
    /// transaction, matching the reference's `resetPassword`. Returns
    /// whether a matching account was found; the actual "mail the user a
    /// new password" step is the server's concern, not this store's.
    pub fn reset_password(&mut self, email: &str, reset_token: &str) -> Result<bool, PersistError> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE auth SET password_reset = ?1, resend_retry = ?2 WHERE email = ?3",
            params![reset_token, now_unix(), email],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    pub fn log(&mut self, action: &str, text: &str) -> Result<(), PersistError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "REPLACE INTO log (timestamp, action, text) VALUES (?1, ?2, ?3)",
            params![now_unix(), action, text],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>, PersistError> {
        self.conn
            .query_row("SELECT value FROM config WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(PersistError::from)
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.conn
            .execute("REPLACE INTO config (key, value) VALUES (?1, ?2)", params![key, value])?;
        Ok(())
    }

    /// Records a ban/throttle entry keyed by `(affected, context)`. The
    /// server reuses this table as a rate-limit trick: a short-lived ban
    /// under a context like `"world.save"` gates how often a player can
    /// trigger an expensive action, with no separate token-bucket table.
    pub fn ban(&mut self, entry: &BanEntry) -> Result<(), PersistError> {
        self.conn.execute(
            "REPLACE INTO bans (affected, context, expiry, comment) VALUES (?1, ?2, ?3, ?4)",
            params![entry.affected, entry.context, entry.expiry, entry.comment],
        )?;
        Ok(())
    }

    /// Returns the active ban for `(affected, context)`, if its expiry is
    /// still in the future. An expired row is treated as "no ban" without
    /// being deleted here — `cleanup_bans` does that in bulk.
    pub fn get_ban(&self, affected: &str, context: &str) -> Result<Option<BanEntry>, PersistError> {
        let row: Option<BanEntry> = self
            .conn
            .query_row(
                "SELECT affected, context, expiry, comment FROM bans WHERE affected = ?1 AND context = ?2",
                params![affected, context],
                |row| {
                    Ok(BanEntry {
                        affected: row.get(0)?,
                        context: row.get(1)?,
                        expiry: row.get(2)?,
                        comment: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row.filter(|b| b.expiry > now_unix()))
    }

    /// Deletes every ban whose expiry has already passed. Returns how
    /// many rows were removed.
    pub fn cleanup_bans(&mut self) -> Result<usize, PersistError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM bans WHERE expiry <= ?1", params![now_unix()])?;
        tx.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saving_then_loading_by_name_round_trips() {
        let mut store = AuthStore::open_in_memory().unwrap();
        let account = Account::new("alice", "alice@example.com", "hunter2");
        store.save(&account).unwrap();

        let loaded = store.load("alice").unwrap().expect("account must exist");
        assert_eq!(loaded.email, "alice@example.com");
        assert_eq!(loaded.password, account.password);
        assert_eq!(loaded.level, AccountLevel::Registered);
    }

    #[test]
    fn loading_by_email_finds_the_same_account() {
        let mut store = AuthStore::open_in_memory().unwrap();
        store.save(&Account::new("bob", "bob@example.com", "pw")).unwrap();
        let loaded = store.load("bob@example.com").unwrap().unwrap();
        assert_eq!(loaded.name, "bob");
    }

    #[test]
    fn password_hash_is_deterministic_and_not_plaintext() {
        let hash = hash_password("hunter2");
        assert_eq!(hash, hash_password("hunter2"));
        assert_ne!(hash, "hunter2");
        assert_eq!(hash.len(), 48 * 2);
    }

    #[test]
    fn challenge_response_is_deterministic_and_challenge_dependent() {
        let hash = hash_password("hunter2");
        let a = challenge_response(&hash, b"randomsalt1234567890");
        let b = challenge_response(&hash, b"randomsalt1234567890");
        let c = challenge_response(&hash, b"different-challenge.");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 48);
    }

    #[test]
    fn account_level_from_raw_follows_the_ladder() {
        assert_eq!(AccountLevel::from_raw(0), AccountLevel::Invalid);
        assert_eq!(AccountLevel::from_raw(5), AccountLevel::Registered);
        assert_eq!(AccountLevel::from_raw(7), AccountLevel::Registered);
        assert_eq!(AccountLevel::from_raw(10), AccountLevel::Moderator);
        assert_eq!(AccountLevel::from_raw(42), AccountLevel::ServerAdmin);
        assert_eq!(AccountLevel::from_raw(1000), AccountLevel::ServerAdmin);
    }

    #[test]
    fn reset_password_updates_existing_account_only() {
        let mut store = AuthStore::open_in_memory().unwrap();
        store.save(&Account::new("carol", "carol@example.com", "pw")).unwrap();
        assert!(store.reset_password("carol@example.com", "newtoken").unwrap());
        assert!(!store.reset_password("nobody@example.com", "x").unwrap());

        let loaded = store.load("carol").unwrap().unwrap();
        assert_eq!(loaded.password_reset, "newtoken");
    }

    #[test]
    fn config_round_trips() {
        let store = AuthStore::open_in_memory().unwrap();
        assert_eq!(store.get_config("motd").unwrap(), None);
        store.set_config("motd", "welcome").unwrap();
        assert_eq!(store.get_config("motd").unwrap(), Some("welcome".to_string()));
    }

    #[test]
    fn expired_ban_is_not_returned_but_active_one_is() {
        let mut store = AuthStore::open_in_memory().unwrap();
        store
            .ban(&BanEntry {
                affected: "dave".into(),
                context: "world.save".into(),
                expiry: now_unix() - 10,
                comment: "expired".into(),
            })
            .unwrap();
        assert!(store.get_ban("dave", "world.save").unwrap().is_none());

        store
            .ban(&BanEntry {
                affected: "dave".into(),
                context: "world.save".into(),
                expiry: now_unix() + 3600,
                comment: "active".into(),
            })
            .unwrap();
        assert!(store.get_ban("dave", "world.save").unwrap().is_some());
    }

    #[test]
    fn cleanup_bans_removes_only_expired_rows() {
        let mut store = AuthStore::open_in_memory().unwrap();
        store
            .ban(&BanEntry { affected: "a".into(), context: "c".into(), expiry: now_unix() - 1, comment: String::new() })
            .unwrap();
        store
            .ban(&BanEntry { affected: "b".into(), context: "c".into(), expiry: now_unix() + 1000, comment: String::new() })
            .unwrap();
        assert_eq!(store.cleanup_bans().unwrap(), 1);
        assert!(store.get_ban("b", "c").unwrap().is_some());
    }
}
