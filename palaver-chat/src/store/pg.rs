use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use palaver_shared::clients::db::{checkout, DbPool};
use palaver_shared::errors::{AppError, AppResult, ErrorCode};

use super::{group_not_found, user_not_found, ChatStore};
use crate::models::{
    ChatMessage, DirectMessageRow, Group, GroupChanges, GroupMessageRow, GroupWithMembers,
    MessageTarget, NewChatMessage, NewDirectMessageRow, NewGroup, NewGroupMember,
    NewGroupMessageRow, NewSession, NewUser, SessionRecord, User, UserChanges,
};
use crate::schema::{group_members, group_messages, groups, messages, sessions, users};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Maps unique-index violations on `users` to the matching conflict code.
fn user_conflict(err: DieselError) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
            if info.constraint_name().is_some_and(|c| c.contains("email")) {
                AppError::new(ErrorCode::EmailTaken, "email already exists")
            } else {
                AppError::new(ErrorCode::UsernameTaken, "username already exists")
            }
        }
        other => AppError::Database(other),
    }
}

fn load_members(conn: &mut PgConnection, group_id: Uuid) -> QueryResult<Vec<String>> {
    group_members::table
        .filter(group_members::group_id.eq(group_id))
        .order(group_members::joined_at.asc())
        .select(group_members::username)
        .load::<String>(conn)
}

fn with_members(conn: &mut PgConnection, group: Group) -> QueryResult<GroupWithMembers> {
    let members = load_members(conn, group.id)?;
    Ok(GroupWithMembers { group, members })
}

impl ChatStore for PgStore {
    fn ping(&self) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut conn = checkout(&self.pool)?;
        diesel::insert_into(users::table)
            .values(&user)
            .get_result::<User>(&mut conn)
            .map_err(user_conflict)
    }

    fn find_user(&self, username: &str) -> AppResult<Option<User>> {
        let mut conn = checkout(&self.pool)?;
        Ok(users::table
            .filter(users::username.eq(username))
            .first::<User>(&mut conn)
            .optional()?)
    }

    fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let mut conn = checkout(&self.pool)?;
        Ok(users::table
            .filter(users::email.eq(email))
            .first::<User>(&mut conn)
            .optional()?)
    }

    fn list_users(&self) -> AppResult<Vec<User>> {
        let mut conn = checkout(&self.pool)?;
        Ok(users::table.order(users::username.asc()).load::<User>(&mut conn)?)
    }

    fn update_user(&self, username: &str, changes: &UserChanges) -> AppResult<User> {
        let mut conn = checkout(&self.pool)?;
        if changes.is_empty() {
            return users::table
                .filter(users::username.eq(username))
                .first::<User>(&mut conn)
                .optional()?
                .ok_or_else(|| user_not_found(username));
        }

        diesel::update(users::table.filter(users::username.eq(username)))
            .set(changes)
            .get_result::<User>(&mut conn)
            .optional()
            .map_err(user_conflict)?
            .ok_or_else(|| user_not_found(username))
    }

    fn insert_session(&self, session: NewSession) -> AppResult<SessionRecord> {
        let mut conn = checkout(&self.pool)?;
        Ok(diesel::insert_into(sessions::table)
            .values(&session)
            .get_result::<SessionRecord>(&mut conn)?)
    }

    fn find_session(&self, id: Uuid) -> AppResult<Option<SessionRecord>> {
        let mut conn = checkout(&self.pool)?;
        Ok(sessions::table
            .find(id)
            .first::<SessionRecord>(&mut conn)
            .optional()?)
    }

    fn delete_session(&self, id: Uuid) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::delete(sessions::table.find(id)).execute(&mut conn)?;
        Ok(())
    }

    fn rebind_sessions(&self, from: &str, to: &str) -> AppResult<usize> {
        let mut conn = checkout(&self.pool)?;
        Ok(diesel::update(sessions::table.filter(sessions::username.eq(from)))
            .set(sessions::username.eq(to))
            .execute(&mut conn)?)
    }

    fn insert_group(&self, group: NewGroup, members: &[String]) -> AppResult<GroupWithMembers> {
        let mut conn = checkout(&self.pool)?;
        conn.transaction::<_, AppError, _>(|conn| {
            let created = diesel::insert_into(groups::table)
                .values(&group)
                .get_result::<Group>(conn)?;

            // joined_at defaults to clock_timestamp(), so one statement per member
            // keeps join order inside the transaction.
            for username in members {
                diesel::insert_into(group_members::table)
                    .values(&NewGroupMember { group_id: created.id, username })
                    .on_conflict_do_nothing()
                    .execute(conn)?;
            }

            Ok(with_members(conn, created)?)
        })
    }

    fn find_group(&self, id: Uuid) -> AppResult<Option<GroupWithMembers>> {
        let mut conn = checkout(&self.pool)?;
        let Some(group) = groups::table.find(id).first::<Group>(&mut conn).optional()? else {
            return Ok(None);
        };
        Ok(Some(with_members(&mut conn, group)?))
    }

    fn groups_for_member(&self, username: &str) -> AppResult<Vec<GroupWithMembers>> {
        let mut conn = checkout(&self.pool)?;
        let found = groups::table
            .inner_join(group_members::table)
            .filter(group_members::username.eq(username))
            .order(groups::created_at.asc())
            .select(groups::all_columns)
            .load::<Group>(&mut conn)?;

        found
            .into_iter()
            .map(|group| with_members(&mut conn, group).map_err(AppError::from))
            .collect()
    }

    fn update_group(&self, id: Uuid, changes: &GroupChanges) -> AppResult<GroupWithMembers> {
        let mut conn = checkout(&self.pool)?;
        let group = if changes.is_empty() {
            groups::table.find(id).first::<Group>(&mut conn).optional()?
        } else {
            diesel::update(groups::table.find(id))
                .set((changes, groups::revision.eq(groups::revision + 1)))
                .get_result::<Group>(&mut conn)
                .optional()?
        };
        let group = group.ok_or_else(|| group_not_found(id))?;
        Ok(with_members(&mut conn, group)?)
    }

    fn apply_member_changes(&self, id: Uuid, add: &[String], remove: &[String]) -> AppResult<GroupWithMembers> {
        let mut conn = checkout(&self.pool)?;
        conn.transaction::<_, AppError, _>(|conn| {
            // Row lock serializes concurrent edits of the same group.
            let group = groups::table
                .find(id)
                .for_update()
                .first::<Group>(conn)
                .optional()?
                .ok_or_else(|| group_not_found(id))?;

            if !remove.is_empty() {
                diesel::delete(
                    group_members::table
                        .filter(group_members::group_id.eq(id))
                        .filter(group_members::username.eq_any(remove))
                        .filter(group_members::username.ne(&group.created_by)),
                )
                .execute(conn)?;
            }

            for username in add {
                diesel::insert_into(group_members::table)
                    .values(&NewGroupMember { group_id: id, username })
                    .on_conflict_do_nothing()
                    .execute(conn)?;
            }

            let bumped = diesel::update(groups::table.find(id))
                .set(groups::revision.eq(groups::revision + 1))
                .get_result::<Group>(conn)?;

            Ok(with_members(conn, bumped)?)
        })
    }

    fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage> {
        let mut conn = checkout(&self.pool)?;
        let id = Uuid::now_v7();
        let reply_id = message.reply_to.as_ref().and_then(|r| r.message_id);
        let reply_text = message.reply_to.as_ref().map(|r| r.text.as_str());
        let status = message.status.map(|s| s.as_str());

        match &message.target {
            MessageTarget::User(receiver) => {
                let row = diesel::insert_into(messages::table)
                    .values(&NewDirectMessageRow {
                        id,
                        sender: &message.sender,
                        receiver,
                        kind: message.kind.as_str(),
                        message: &message.message,
                        file_name: &message.file_name,
                        file_url: &message.file_url,
                        status,
                        reply_to_message_id: reply_id,
                        reply_to_text: reply_text,
                        sent_at: message.timestamp,
                    })
                    .get_result::<DirectMessageRow>(&mut conn)?;
                Ok(row.into())
            }
            MessageTarget::Group(group_id) => {
                let row = diesel::insert_into(group_messages::table)
                    .values(&NewGroupMessageRow {
                        id,
                        sender: &message.sender,
                        group_id: *group_id,
                        kind: message.kind.as_str(),
                        message: &message.message,
                        file_name: &message.file_name,
                        file_url: &message.file_url,
                        status,
                        reply_to_message_id: reply_id,
                        reply_to_text: reply_text,
                        sent_at: message.timestamp,
                    })
                    .get_result::<GroupMessageRow>(&mut conn)?;
                Ok(row.into())
            }
        }
    }

    fn find_message(&self, id: Uuid) -> AppResult<Option<ChatMessage>> {
        let mut conn = checkout(&self.pool)?;
        if let Some(row) = messages::table
            .find(id)
            .first::<DirectMessageRow>(&mut conn)
            .optional()?
        {
            return Ok(Some(row.into()));
        }

        Ok(group_messages::table
            .find(id)
            .first::<GroupMessageRow>(&mut conn)
            .optional()?
            .map(ChatMessage::from))
    }

    fn direct_conversation(&self, a: &str, b: &str) -> AppResult<Vec<ChatMessage>> {
        let mut conn = checkout(&self.pool)?;
        let rows = messages::table
            .filter(
                messages::sender
                    .eq(a)
                    .and(messages::receiver.eq(b))
                    .or(messages::sender.eq(b).and(messages::receiver.eq(a))),
            )
            .order((messages::sent_at.asc(), messages::id.asc()))
            .load::<DirectMessageRow>(&mut conn)?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    fn group_conversation(&self, group_id: Uuid) -> AppResult<Vec<ChatMessage>> {
        let mut conn = checkout(&self.pool)?;
        let rows = group_messages::table
            .filter(group_messages::group_id.eq(group_id))
            .order((group_messages::sent_at.asc(), group_messages::id.asc()))
            .load::<GroupMessageRow>(&mut conn)?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }
}
