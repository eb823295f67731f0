//! AUTH and the ACL subcommands
//!
//! A minimal user registry with a single built-in `default` user that
//! starts with the nopass flag. Passwords are stored as hex SHA-1 digests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use sha1::{Digest, Sha1};

use crate::error::CommandError;
use crate::protocol::RespFrame;

use super::{arg_str, err_frame, wrong_args, CommandContext, CommandName};

const NOPASS: &str = "nopass";
const DEFAULT_USER: &str = "default";

/// One ACL user
#[derive(Debug, Default, Clone)]
pub struct User {
    flags: HashSet<String>,
    passwords: HashSet<String>,
}

impl User {
    fn nopass() -> Self {
        let mut user = User::default();
        user.flags.insert(NOPASS.to_string());
        user
    }

    fn add_password(&mut self, password: &str) {
        self.passwords.insert(digest(password));
        self.flags.remove(NOPASS);
    }

    fn accepts(&self, password: &str) -> bool {
        self.flags.contains(NOPASS) || self.passwords.contains(&digest(password))
    }
}

/// Registry of ACL users
pub struct UserRegistry {
    users: Mutex<HashMap<String, User>>,
}

impl UserRegistry {
    /// Create the registry with the built-in default user
    pub fn new() -> Self {
        let mut users = HashMap::new();
        users.insert(DEFAULT_USER.to_string(), User::nopass());
        UserRegistry {
            users: Mutex::new(users),
        }
    }

    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users
            .lock()
            .unwrap()
            .get(username)
            .map(|user| user.accepts(password))
            .unwrap_or(false)
    }

    fn get(&self, username: &str) -> Option<User> {
        self.users.lock().unwrap().get(username).cloned()
    }

    fn apply_rules(&self, username: &str, rules: &[&str]) {
        let mut users = self.users.lock().unwrap();
        let user = users.entry(username.to_string()).or_default();
        for rule in rules {
            if let Some(password) = rule.strip_prefix('>') {
                user.add_password(password);
            } else if rule.eq_ignore_ascii_case(NOPASS) {
                user.passwords.clear();
                user.flags.insert(NOPASS.to_string());
            } else {
                user.flags.insert(rule.to_ascii_lowercase());
            }
        }
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn digest(password: &str) -> String {
    hex::encode(Sha1::digest(password.as_bytes()))
}

/// AUTH [username] password
pub fn auth(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    let (username, password) = match args.len() {
        1 => (Some(DEFAULT_USER), arg_str(args, 0)),
        2 => (arg_str(args, 0), arg_str(args, 1)),
        _ => return wrong_args(CommandName::Auth),
    };
    match (username, password) {
        (Some(username), Some(password)) if ctx.users.authenticate(username, password) => {
            RespFrame::ok()
        }
        _ => err_frame(CommandError::WrongPass.into()),
    }
}

/// ACL WHOAMI
pub fn whoami(args: &[Vec<u8>]) -> RespFrame {
    if !args.is_empty() {
        return wrong_args(CommandName::AclWhoami);
    }
    RespFrame::bulk_string(DEFAULT_USER.as_bytes())
}

/// ACL GETUSER username
pub fn getuser(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::AclGetuser);
    }
    let username = match arg_str(args, 0) {
        Some(username) => username,
        None => return err_frame(CommandError::SyntaxError.into()),
    };
    match ctx.users.get(username) {
        Some(user) => {
            let mut flags: Vec<String> = user.flags.iter().cloned().collect();
            flags.sort_unstable();
            let mut passwords: Vec<String> = user.passwords.iter().cloned().collect();
            passwords.sort_unstable();
            RespFrame::array(vec![
                RespFrame::bulk_string(&b"flags"[..]),
                RespFrame::array(
                    flags.into_iter().map(|f| RespFrame::bulk_string(f.into_bytes())).collect(),
                ),
                RespFrame::bulk_string(&b"passwords"[..]),
                RespFrame::array(
                    passwords
                        .into_iter()
                        .map(|p| RespFrame::bulk_string(p.into_bytes()))
                        .collect(),
                ),
            ])
        }
        None => RespFrame::null_array(),
    }
}

/// ACL SETUSER username [rule ...]
pub fn setuser(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.is_empty() {
        return wrong_args(CommandName::AclSetuser);
    }
    let username = match arg_str(args, 0) {
        Some(username) => username,
        None => return err_frame(CommandError::SyntaxError.into()),
    };
    let rules: Vec<&str> = args[1..]
        .iter()
        .filter_map(|rule| std::str::from_utf8(rule).ok())
        .collect();
    ctx.users.apply_rules(username, &rules);
    RespFrame::ok()
}
