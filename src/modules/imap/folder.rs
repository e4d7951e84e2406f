// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::imap::{quote_mailbox, ImapStatus, SharedImapConnection};
use crate::modules::mime::datetime::DateTime;
use crate::modules::mime::header::Header;
use crate::modules::mime::part::Message;
use crate::modules::mime::{Component, ParsingContext};
use crate::modules::store::message::{
    report_extracted, structure_of, write_region, StoredMessage,
};
use crate::modules::store::types::{
    FetchAttributes, Flags, FlagsOp, FolderPath, FolderStatus, FolderType, MessageRange,
    MessageSet, MessageStructure, OpenMode,
};
use crate::modules::store::Folder;
use crate::modules::stream::{OutputStream, ProgressListener};
use crate::{raise_error, unfetched};
use itertools::Itertools;

/// The hierarchy delimiter assumed for folder paths.
const DELIMITER: char = '/';

fn flags_to_wire(flags: Flags) -> String {
    let mut words = Vec::new();
    if flags.contains(Flags::SEEN) {
        words.push("\\Seen");
    }
    if flags.contains(Flags::REPLIED) {
        words.push("\\Answered");
    }
    if flags.contains(Flags::MARKED) {
        words.push("\\Flagged");
    }
    if flags.contains(Flags::DELETED) {
        words.push("\\Deleted");
    }
    if flags.contains(Flags::DRAFT) {
        words.push("\\Draft");
    }
    format!("({})", words.iter().join(" "))
}

fn flags_from_wire(list: &str) -> Flags {
    let mut flags = Flags::empty();
    for word in list.split_ascii_whitespace() {
        match word.trim_matches(['(', ')']).to_ascii_lowercase().as_str() {
            "\\seen" => flags.insert(Flags::SEEN),
            "\\answered" => flags.insert(Flags::REPLIED),
            "\\flagged" => flags.insert(Flags::MARKED),
            "\\deleted" => flags.insert(Flags::DELETED),
            "\\draft" => flags.insert(Flags::DRAFT),
            "\\recent" => flags.insert(Flags::RECENT),
            _ => {}
        }
    }
    flags
}

/// The word following `keyword` in a response line.
fn number_after(text: &str, keyword: &str) -> Option<u64> {
    let position = text.find(keyword)?;
    text[position + keyword.len()..]
        .split_ascii_whitespace()
        .next()
        .map(|word| word.trim_matches([')', ']']))
        .and_then(|word| word.parse().ok())
}

/// The parenthesised list following `keyword`.
fn list_after<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let position = text.find(keyword)?;
    let rest = &text[position + keyword.len()..];
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    Some(&rest[open + 1..close])
}

/// Render a message set for the wire, and whether it is UID-based.
fn set_to_wire(set: &MessageSet) -> (String, bool) {
    let mut pieces = Vec::new();
    let mut is_uid = false;
    for range in set.ranges() {
        match range {
            MessageRange::Number { first, last } => {
                if first == last {
                    pieces.push(first.to_string());
                } else {
                    pieces.push(format!("{}:{}", first, last));
                }
            }
            MessageRange::Uid { first, last } => {
                is_uid = true;
                if first == last {
                    pieces.push(first.to_string());
                } else {
                    pieces.push(format!("{}:{}", first, last));
                }
            }
        }
    }
    (pieces.iter().join(","), is_uid)
}

pub struct ImapFolder {
    connection: SharedImapConnection,
    path: FolderPath,
    mode: Option<OpenMode>,
    exists_count: usize,
}

impl ImapFolder {
    pub(crate) fn new(connection: SharedImapConnection, path: FolderPath) -> Self {
        Self {
            connection,
            path,
            mode: None,
            exists_count: 0,
        }
    }

    fn mailbox_name(&self) -> String {
        self.path.join(DELIMITER)
    }

    fn require_open(&self) -> MailForgeResult<()> {
        if self.mode.is_none() {
            return Err(raise_error!(
                format!("folder '{}' is not open", self.mailbox_name()),
                ErrorCode::IllegalState
            ));
        }
        Ok(())
    }

    fn require_writable(&self) -> MailForgeResult<()> {
        self.require_open()?;
        if self.mode == Some(OpenMode::ReadOnly) {
            return Err(raise_error!(
                format!("folder '{}' is open read-only", self.mailbox_name()),
                ErrorCode::IllegalOperation
            ));
        }
        Ok(())
    }
}

impl Folder for ImapFolder {
    fn path(&self) -> FolderPath {
        self.path.clone()
    }

    fn open(&mut self, mode: OpenMode) -> MailForgeResult<()> {
        if self.mode.is_some() {
            return Err(raise_error!(
                format!("folder '{}' is already open", self.mailbox_name()),
                ErrorCode::FolderAlreadyOpen
            ));
        }
        let verb = if mode == OpenMode::ReadOnly {
            "EXAMINE"
        } else {
            "SELECT"
        };
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        let response =
            guard.command(&format!("{} {}", verb, quote_mailbox(&self.mailbox_name())))?;
        if response.status != ImapStatus::Ok {
            return Err(raise_error!(
                format!(
                    "cannot open folder '{}': {}",
                    self.mailbox_name(),
                    response.text
                ),
                ErrorCode::FolderNotFound
            ));
        }
        self.exists_count = response
            .untagged
            .iter()
            .find(|line| line.text.ends_with("EXISTS"))
            .and_then(|line| line.text.split_ascii_whitespace().nth(1))
            .and_then(|word| word.parse().ok())
            .unwrap_or(0);
        self.mode = Some(match mode {
            OpenMode::Default => OpenMode::ReadWrite,
            other => other,
        });
        Ok(())
    }

    fn close(&mut self, expunge: bool) -> MailForgeResult<()> {
        self.require_open()?;
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        if expunge {
            // CLOSE implicitly expunges the selected mailbox
            guard.expect_ok("CLOSE")?;
        } else {
            // avoid the implicit expunge when possible
            let _ = guard.command("UNSELECT");
        }
        drop(guard);
        self.mode = None;
        self.exists_count = 0;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    fn mode(&self) -> Option<OpenMode> {
        self.mode
    }

    fn exists(&self) -> bool {
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        guard
            .command(&format!(
                "LIST \"\" {}",
                quote_mailbox(&self.mailbox_name())
            ))
            .map(|response| {
                response.status == ImapStatus::Ok
                    && response
                        .untagged
                        .iter()
                        .any(|line| line.text.starts_with("* LIST"))
            })
            .unwrap_or(false)
    }

    fn create(&mut self, folder_type: FolderType) -> MailForgeResult<()> {
        let mut name = self.mailbox_name();
        if folder_type == FolderType::HoldsFolders {
            name.push(DELIMITER);
        }
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        guard.expect_ok(&format!("CREATE {}", quote_mailbox(&name)))?;
        Ok(())
    }

    fn destroy(&mut self) -> MailForgeResult<()> {
        if self.is_open() {
            return Err(raise_error!(
                "cannot destroy an open folder".into(),
                ErrorCode::IllegalState
            ));
        }
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        guard.expect_ok(&format!(
            "DELETE {}",
            quote_mailbox(&self.mailbox_name())
        ))?;
        Ok(())
    }

    fn rename(&mut self, new_path: &FolderPath) -> MailForgeResult<()> {
        if self.is_open() {
            return Err(raise_error!(
                "cannot rename an open folder".into(),
                ErrorCode::IllegalState
            ));
        }
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        guard.expect_ok(&format!(
            "RENAME {} {}",
            quote_mailbox(&self.mailbox_name()),
            quote_mailbox(&new_path.join(DELIMITER))
        ))?;
        drop(guard);
        self.path = new_path.clone();
        Ok(())
    }

    fn message_count(&mut self) -> MailForgeResult<usize> {
        if self.is_open() {
            return Ok(self.exists_count);
        }
        Ok(self.status()?.message_count)
    }

    fn status(&mut self) -> MailForgeResult<FolderStatus> {
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        let response = guard.expect_ok(&format!(
            "STATUS {} (MESSAGES UNSEEN)",
            quote_mailbox(&self.mailbox_name())
        ))?;
        drop(guard);
        let line = response.find_untagged("STATUS").ok_or_else(|| {
            raise_error!(
                "missing STATUS response".into(),
                ErrorCode::InvalidResponse
            )
        })?;
        Ok(FolderStatus {
            message_count: number_after(&line.text, "MESSAGES").unwrap_or(0) as usize,
            unseen_count: number_after(&line.text, "UNSEEN").unwrap_or(0) as usize,
        })
    }

    fn get_messages(&mut self, set: &MessageSet) -> MailForgeResult<Vec<Box<dyn StoredMessage>>> {
        self.require_open()?;
        let mut messages: Vec<Box<dyn StoredMessage>> = Vec::new();
        for range in set.ranges() {
            match range {
                MessageRange::Number { first, last } => {
                    for number in *first..=*last {
                        if number == 0 || number as usize > self.exists_count {
                            return Err(raise_error!(
                                format!(
                                    "no message {} (folder has {})",
                                    number, self.exists_count
                                ),
                                ErrorCode::MessageNotFound
                            ));
                        }
                        messages.push(Box::new(ImapMessage::by_number(
                            self.connection.clone(),
                            number,
                        )));
                    }
                }
                MessageRange::Uid { first, last } => {
                    for uid in *first..=*last {
                        messages.push(Box::new(ImapMessage::by_uid(
                            self.connection.clone(),
                            uid,
                        )));
                    }
                }
            }
        }
        Ok(messages)
    }

    fn add_message(
        &mut self,
        message: &[u8],
        flags: Flags,
        _date: Option<&DateTime>,
    ) -> MailForgeResult<MessageSet> {
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        let command = format!(
            "APPEND {} {}",
            quote_mailbox(&self.mailbox_name()),
            flags_to_wire(flags)
        );
        let response = guard.command_with_literal(&command, message)?;
        if response.status != ImapStatus::Ok {
            return Err(raise_error!(
                format!("APPEND failed: {}", response.text),
                ErrorCode::CommandFailed
            ));
        }
        // RFC 4315: OK [APPENDUID <uidvalidity> <uid>]
        if let Some(position) = response.text.find("APPENDUID") {
            let mut words = response.text[position..].split_ascii_whitespace().skip(2);
            if let Some(uid) = words
                .next()
                .map(|word| word.trim_matches([']', ')']))
                .and_then(|word| word.parse().ok())
            {
                return Ok(MessageSet::single_uid(uid));
            }
        }
        Ok(MessageSet::empty())
    }

    fn copy_messages(
        &mut self,
        destination: &FolderPath,
        set: &MessageSet,
    ) -> MailForgeResult<MessageSet> {
        self.require_open()?;
        let (wire_set, is_uid) = set_to_wire(set);
        let verb = if is_uid { "UID COPY" } else { "COPY" };
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        let response = guard.expect_ok(&format!(
            "{} {} {}",
            verb,
            wire_set,
            quote_mailbox(&destination.join(DELIMITER))
        ))?;
        drop(guard);

        // RFC 4315: OK [COPYUID <uidvalidity> <src-uids> <dest-uids>]
        if let Some(position) = response.text.find("COPYUID") {
            let mut words = response.text[position..].split_ascii_whitespace().skip(3);
            if let Some(destination_uids) = words.next() {
                let destination_uids = destination_uids.trim_matches([']', ')']);
                let mut result = MessageSet::empty();
                for piece in destination_uids.split(',') {
                    let (first, last) = match piece.split_once(':') {
                        Some((first, last)) => (first.parse().ok(), last.parse().ok()),
                        None => (piece.parse().ok(), piece.parse().ok()),
                    };
                    if let (Some(first), Some(last)) = (first, last) {
                        result.push(MessageRange::Uid { first, last });
                    }
                }
                if !result.is_empty() {
                    return Ok(result);
                }
            }
        }
        Ok(MessageSet::empty())
    }

    fn delete_messages(&mut self, set: &MessageSet) -> MailForgeResult<()> {
        self.set_message_flags(set, Flags::DELETED, FlagsOp::Add)
    }

    fn set_message_flags(
        &mut self,
        set: &MessageSet,
        flags: Flags,
        op: FlagsOp,
    ) -> MailForgeResult<()> {
        self.require_writable()?;
        let (wire_set, is_uid) = set_to_wire(set);
        let verb = if is_uid { "UID STORE" } else { "STORE" };
        let operation = match op {
            FlagsOp::Set => "FLAGS",
            FlagsOp::Add => "+FLAGS",
            FlagsOp::Remove => "-FLAGS",
        };
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        guard.expect_ok(&format!(
            "{} {} {} {}",
            verb,
            wire_set,
            operation,
            flags_to_wire(flags)
        ))?;
        Ok(())
    }

    fn expunge(&mut self) -> MailForgeResult<()> {
        self.require_writable()?;
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        guard.expect_ok("EXPUNGE")?;
        Ok(())
    }

    fn sub_folders(&mut self) -> MailForgeResult<Vec<FolderPath>> {
        let pattern = if self.path.is_root() {
            "%".to_string()
        } else {
            format!("{}{}%", self.mailbox_name(), DELIMITER)
        };
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        let response = guard.expect_ok(&format!("LIST \"\" {}", quote_mailbox(&pattern)))?;
        drop(guard);

        let mut folders = Vec::new();
        for line in &response.untagged {
            if !line.text.starts_with("* LIST") {
                continue;
            }
            // the mailbox name is the last token, possibly quoted
            let name = match line.text.rfind('"') {
                Some(end) => {
                    let head = &line.text[..end];
                    head.rfind('"')
                        .map(|start| head[start + 1..].to_string())
                }
                None => line
                    .text
                    .split_ascii_whitespace()
                    .last()
                    .map(|word| word.to_string()),
            };
            if let Some(name) = name {
                folders.push(FolderPath::from_str_path(&name, DELIMITER));
            }
        }
        Ok(folders)
    }
}

/// One IMAP message, addressed by sequence number or UID.
pub struct ImapMessage {
    connection: SharedImapConnection,
    number: u32,
    uid: Option<u64>,
    fetched: FetchAttributes,
    size: Option<u64>,
    flags: Option<Flags>,
    header: Option<Header>,
    structure: Option<MessageStructure>,
}

impl ImapMessage {
    fn by_number(connection: SharedImapConnection, number: u32) -> Self {
        Self {
            connection,
            number,
            uid: None,
            fetched: FetchAttributes::empty(),
            size: None,
            flags: None,
            header: None,
            structure: None,
        }
    }

    fn by_uid(connection: SharedImapConnection, uid: u64) -> Self {
        let mut message = Self::by_number(connection, 0);
        message.uid = Some(uid);
        message
    }

    fn fetch_command(&self, items: &str) -> String {
        match self.uid {
            Some(uid) if self.number == 0 => format!("UID FETCH {} ({})", uid, items),
            _ => format!("FETCH {} ({})", self.number, items),
        }
    }

    fn fetch_literal(&self, items: &str) -> MailForgeResult<Vec<u8>> {
        let mut guard = self.connection.lock().expect("imap connection poisoned");
        let response = guard.expect_ok(&self.fetch_command(items))?;
        drop(guard);
        response
            .untagged
            .iter()
            .find(|line| line.text.contains("FETCH") && !line.literals.is_empty())
            .and_then(|line| line.literals.first().cloned())
            .ok_or_else(|| {
                raise_error!(
                    format!("FETCH returned no data for {}", items),
                    ErrorCode::InvalidResponse
                )
            })
    }

    fn download(&self) -> MailForgeResult<Vec<u8>> {
        self.fetch_literal("BODY.PEEK[]")
    }
}

impl StoredMessage for ImapMessage {
    fn number(&self) -> u32 {
        self.number
    }

    fn uid(&self) -> Option<u64> {
        self.uid
    }

    fn fetched_attributes(&self) -> FetchAttributes {
        self.fetched
    }

    fn fetch(&mut self, attributes: FetchAttributes) -> MailForgeResult<()> {
        let missing = self.fetched.missing_from(attributes);
        if missing.is_empty() {
            return Ok(());
        }

        let wants_meta = missing.contains(FetchAttributes::FLAGS)
            || missing.contains(FetchAttributes::SIZE)
            || missing.contains(FetchAttributes::UID);
        if wants_meta {
            let mut guard = self.connection.lock().expect("imap connection poisoned");
            let response =
                guard.expect_ok(&self.fetch_command("FLAGS RFC822.SIZE UID"))?;
            drop(guard);
            let line = response.find_untagged("FETCH").ok_or_else(|| {
                raise_error!(
                    "missing FETCH response".into(),
                    ErrorCode::InvalidResponse
                )
            })?;
            if self.flags.is_none() {
                self.flags = Some(
                    list_after(&line.text, "FLAGS")
                        .map(flags_from_wire)
                        .unwrap_or_default(),
                );
            }
            if self.size.is_none() {
                self.size = number_after(&line.text, "RFC822.SIZE");
            }
            if self.uid.is_none() {
                self.uid = number_after(&line.text, "UID ");
            }
            if self.number == 0 {
                if let Some(number) = line
                    .text
                    .split_ascii_whitespace()
                    .nth(1)
                    .and_then(|word| word.parse().ok())
                {
                    self.number = number;
                }
            }
        }

        let wants_header = missing.contains(FetchAttributes::FULL_HEADER)
            || missing.contains(FetchAttributes::ENVELOPE)
            || missing.contains(FetchAttributes::CUSTOM_HEADERS)
            || missing.contains(FetchAttributes::IMPORTANCE);
        if wants_header && self.header.is_none() {
            let bytes = self.fetch_literal("BODY.PEEK[HEADER]")?;
            let mut header = Header::new();
            let length = bytes.len();
            header.parse(&ParsingContext::default(), &bytes, 0, length)?;
            self.header = Some(header);
        }

        let wants_structure = missing.contains(FetchAttributes::STRUCTURE)
            || missing.contains(FetchAttributes::CONTENT_INFO);
        if wants_structure && self.structure.is_none() {
            let bytes = self.download()?;
            let message = Message::parse_message(&ParsingContext::default(), bytes)?;
            self.structure = Some(structure_of(&message));
        }

        self.fetched.insert(attributes);
        Ok(())
    }

    fn size(&self) -> MailForgeResult<u64> {
        self.size.ok_or_else(|| unfetched!("size"))
    }

    fn flags(&self) -> MailForgeResult<Flags> {
        self.flags.ok_or_else(|| unfetched!("flags"))
    }

    fn header(&self) -> MailForgeResult<&Header> {
        self.header.as_ref().ok_or_else(|| unfetched!("header"))
    }

    fn structure(&self) -> MailForgeResult<&MessageStructure> {
        self.structure
            .as_ref()
            .ok_or_else(|| unfetched!("structure"))
    }

    fn extract(
        &mut self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let data = self.download()?;
        out.write(&data)?;
        report_extracted(progress, data.len());
        Ok(())
    }

    fn extract_part(
        &mut self,
        part_path: &[usize],
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
        start: Option<u64>,
        length: Option<u64>,
    ) -> MailForgeResult<()> {
        let section: String = part_path
            .iter()
            .map(|index| (index + 1).to_string())
            .collect::<Vec<_>>()
            .join(".");
        let mut item = format!("BODY.PEEK[{}]", section);
        if let (Some(start), Some(length)) = (start, length) {
            // servers honour partial fetches natively
            item.push_str(&format!("<{}.{}>", start, length));
        }
        let data = self.fetch_literal(&item)?;
        // when only one bound was given, window locally
        match (start, length) {
            (Some(_), Some(_)) | (None, None) => out.write(&data)?,
            _ => write_region(&data, out, start, length)?,
        }
        report_extracted(progress, data.len());
        Ok(())
    }
}
