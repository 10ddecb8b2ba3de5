/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Namespace composition.
//!
//! Builds the per-connection view of a user's folders from what the access
//! layer exposes. Two projections exist:
//!
//! - **Domain-separated** (the default): the primary domain's tree roots at
//!   `""`; every other domain roots at `"<domain>/"`.
//! - **Unified**: all owned folders merge under one root. Folders sharing a
//!   special-use role across domains present as one logical name; the entry
//!   records the fan-out list of underlying folders, and actually fanning a
//!   command out across them is the protocol layer's job.
//!
//! Shared mailboxes always appear under the fixed shared root, keyed by
//! owner email, whatever the mode. Switching mode never mutates folder rows;
//! only this projection changes.

use std::collections::BTreeMap;

use store::{Folder, NamespaceMode, OwnedMailbox, SharedMailbox};

/// A namespace root advertised to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePrefix {
    pub prefix: String,
    pub delimiter: String,
}

/// One underlying folder behind a logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderTarget {
    pub mailbox_id: i64,
    pub folder_id: i64,
}

/// A logical folder name and the folder(s) it stands for. More than one
/// target means the unified projection merged special-use folders across
/// domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub logical_path: String,
    pub targets: Vec<FolderTarget>,
}

/// The composed namespace for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Namespace {
    pub personal: Vec<NamespacePrefix>,
    pub other_users: Vec<NamespacePrefix>,
    pub shared: Vec<NamespacePrefix>,
    pub entries: Vec<NamespaceEntry>,
}

impl Namespace {
    /// Looks up the entry for a logical path.
    pub fn entry(&self, logical_path: &str) -> Option<&NamespaceEntry> {
        self.entries
            .iter()
            .find(|entry| entry.logical_path == logical_path)
    }
}

/// Composes the namespace from owned and shared mailboxes with their
/// folders. Pure projection; nothing here touches storage.
pub fn compose(
    owned: &[(OwnedMailbox, Vec<Folder>)],
    shared: &[(SharedMailbox, Vec<Folder>)],
    mode: NamespaceMode,
    primary_domain: &str,
    shared_root: &str,
    delimiter: &str,
) -> Namespace {
    // BTreeMap keeps logical paths ordered and merges fan-in targets.
    let mut entries: BTreeMap<String, Vec<FolderTarget>> = BTreeMap::new();
    let mut personal = Vec::new();

    match mode {
        NamespaceMode::DomainSeparated => {
            personal.push(NamespacePrefix {
                prefix: String::new(),
                delimiter: delimiter.to_string(),
            });
            for (mailbox, folders) in owned {
                let prefix = if mailbox.domain_name == primary_domain {
                    String::new()
                } else {
                    format!("{}{}", mailbox.domain_name, delimiter)
                };
                if !prefix.is_empty()
                    && !personal.iter().any(|p: &NamespacePrefix| p.prefix == prefix)
                {
                    personal.push(NamespacePrefix {
                        prefix: prefix.clone(),
                        delimiter: delimiter.to_string(),
                    });
                }
                for folder in folders {
                    entries
                        .entry(format!("{prefix}{}", folder.full_path))
                        .or_default()
                        .push(FolderTarget {
                            mailbox_id: mailbox.mailbox.id,
                            folder_id: folder.id,
                        });
                }
            }
        }
        NamespaceMode::Unified => {
            personal.push(NamespacePrefix {
                prefix: String::new(),
                delimiter: delimiter.to_string(),
            });
            for (mailbox, folders) in owned {
                for folder in folders {
                    // Special-use folders fold into one logical name across
                    // domains; everything else merges by path.
                    let logical = folder
                        .special_use
                        .map(|role| role.default_path().to_string())
                        .unwrap_or_else(|| folder.full_path.clone());
                    entries.entry(logical).or_default().push(FolderTarget {
                        mailbox_id: mailbox.mailbox.id,
                        folder_id: folder.id,
                    });
                }
            }
        }
    }

    let shared_prefix = format!("{shared_root}{delimiter}");
    for (share, folders) in shared {
        for folder in folders {
            entries
                .entry(format!(
                    "{shared_prefix}{}{delimiter}{}",
                    share.owner_email, folder.full_path
                ))
                .or_default()
                .push(FolderTarget {
                    mailbox_id: share.mailbox.id,
                    folder_id: folder.id,
                });
        }
    }

    Namespace {
        personal,
        other_users: Vec::new(),
        shared: vec![NamespacePrefix {
            prefix: shared_prefix,
            delimiter: delimiter.to_string(),
        }],
        entries: entries
            .into_iter()
            .map(|(logical_path, targets)| NamespaceEntry {
                logical_path,
                targets,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use store::{Mailbox, Permission, SpecialUse};

    use super::*;

    fn mailbox(id: i64, domain_id: i64, email: &str) -> Mailbox {
        Mailbox {
            id,
            user_id: 1,
            domain_id,
            email: email.to_string(),
            display_name: String::new(),
            quota_bytes: 0,
            used_bytes: 0,
            created_at: Utc::now(),
        }
    }

    fn folder(id: i64, mailbox_id: i64, path: &str, role: Option<SpecialUse>) -> Folder {
        Folder {
            id,
            mailbox_id,
            full_path: path.to_string(),
            delimiter: "/".to_string(),
            special_use: role,
            uid_validity: 1,
            uid_next: 1,
            highest_modseq: 0,
            message_count: 0,
            unseen_count: 0,
            attributes: serde_json::json!({}),
        }
    }

    fn two_domain_setup() -> Vec<(OwnedMailbox, Vec<Folder>)> {
        vec![
            (
                OwnedMailbox {
                    mailbox: mailbox(1, 1, "alice@a.com"),
                    domain_name: "a.com".to_string(),
                },
                vec![folder(10, 1, "INBOX", Some(SpecialUse::Inbox))],
            ),
            (
                OwnedMailbox {
                    mailbox: mailbox(2, 2, "alice@b.com"),
                    domain_name: "b.com".to_string(),
                },
                vec![folder(20, 2, "INBOX", Some(SpecialUse::Inbox))],
            ),
        ]
    }

    #[test]
    fn domain_separated_roots_secondary_domains() {
        let owned = two_domain_setup();
        let ns = compose(
            &owned,
            &[],
            NamespaceMode::DomainSeparated,
            "a.com",
            "Shared",
            "/",
        );

        assert!(ns.entry("INBOX").is_some());
        assert!(ns.entry("b.com/INBOX").is_some());
        assert!(ns
            .personal
            .iter()
            .any(|p| p.prefix == "b.com/" && p.delimiter == "/"));
    }

    #[test]
    fn unified_merges_special_use_across_domains() {
        let owned = two_domain_setup();
        let ns = compose(&owned, &[], NamespaceMode::Unified, "a.com", "Shared", "/");

        let inbox = ns.entry("INBOX").expect("merged INBOX");
        assert_eq!(inbox.targets.len(), 2);
        assert!(ns.entry("b.com/INBOX").is_none());
    }

    #[test]
    fn shared_mailboxes_keep_fixed_root_in_both_modes() {
        let shared = vec![(
            SharedMailbox {
                mailbox: mailbox(3, 1, "boss@a.com"),
                owner_email: "boss@a.com".to_string(),
                permissions: vec![Permission::Read],
                expires_at: None,
            },
            vec![folder(30, 3, "INBOX", Some(SpecialUse::Inbox))],
        )];

        for mode in [NamespaceMode::DomainSeparated, NamespaceMode::Unified] {
            let ns = compose(&[], &shared, mode, "a.com", "Shared", "/");
            assert!(ns.entry("Shared/boss@a.com/INBOX").is_some());
            assert_eq!(ns.shared[0].prefix, "Shared/");
        }
    }
}
