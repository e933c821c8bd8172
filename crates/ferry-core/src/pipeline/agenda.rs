//! Agenda items and their content: diff texts, proposals, discussion posts
//! and polls.

use tracing::debug;

use super::meeting::{MeetingScope, PendingReaction};
use super::{Exporter, clip, poll};
use crate::error::{Diagnostic, ErrorCode, Halt};
use crate::model::fields::{
    AgendaItemFields, Authorship, DiffProposalFields, DiscussionPostFields, ProposalFields,
    TextDocumentFields, TextParagraphFields,
};
use crate::model::{EntityKind, Pk};
use crate::source::{AgendaItem, DiffText, DiscussionPost, Proposal};
use crate::tags::TagOrigin;

const MAX_TITLE_LEN: usize = 100;
const MAX_DOCUMENT_TITLE_LEN: usize = 99;
const MAX_BASE_TAG_LEN: usize = 40;

const PROPOSAL_TYPE: [&str; 2] = ["proposal", "proposal"];
const DISCUSSION_POST_TYPE: [&str; 2] = ["discussion", "discussionpost"];

pub(super) fn export_agenda_item(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    item: &AgendaItem,
) -> Result<(), Halt> {
    let path = format!("{}/{}", scope.path, item.name);
    // Items are walked in meeting order, so the pk doubles as the order.
    let order = ex.registry.next_pk(EntityKind::AgendaItem);
    let fields = AgendaItemFields {
        title: clip(&item.title, MAX_TITLE_LEN),
        modified: item.modified,
        created: item.created,
        body: item.body.clone(),
        state: item.state.clone(),
        tags: item.tags.clone(),
        meeting: scope.pk,
        block_discussion: item.discussion_block,
        block_proposals: item.proposal_block,
        order,
    };
    let Some(ai_pk) = ex.emit(&path, EntityKind::AgendaItem, &fields)? else {
        return Ok(());
    };
    scope
        .agenda_items
        .insert(item.uid.clone(), (ai_pk, item.created));

    if let Some(diff) = item.diff_text.as_ref().filter(|diff| !diff.hashtag.is_empty()) {
        diff_text(ex, scope, &path, ai_pk, item, diff)?;
    }
    for proposal in &item.proposals {
        export_proposal(ex, scope, &path, ai_pk, proposal)?;
    }
    for post in &item.discussion_posts {
        export_discussion_post(ex, scope, &path, ai_pk, post)?;
    }
    for source in &item.polls {
        poll::export_poll(ex, scope, &path, ai_pk, source)?;
    }
    Ok(())
}

/// The base text of diff proposals, one paragraph record per paragraph.
fn diff_text(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    path: &str,
    ai_pk: Pk,
    item: &AgendaItem,
    diff: &DiffText,
) -> Result<(), Halt> {
    if diff.hashtag.chars().count() > MAX_BASE_TAG_LEN {
        ex.ledger.critical(
            path,
            Diagnostic::new(
                ErrorCode::FieldTooLong,
                format!(
                    "Text document tag {} is longer than {MAX_BASE_TAG_LEN} chars",
                    diff.hashtag
                ),
            ),
        )?;
        return Ok(());
    }
    let document = TextDocumentFields {
        modified: item.modified,
        created: item.created,
        title: clip(&diff.title, MAX_DOCUMENT_TITLE_LEN),
        body: diff.text.clone(),
        base_tag: diff.hashtag.clone(),
        agenda_item: ai_pk,
    };
    let Some(document_pk) = ex.emit(path, EntityKind::TextDocument, &document)? else {
        return Ok(());
    };

    // Paragraph ids are 1-based; proposals point at them 0-based.
    for (paragraph_id, body) in (1_u32..).zip(&diff.paragraphs) {
        let paragraph = TextParagraphFields {
            modified: item.modified,
            created: item.modified,
            body: body.clone(),
            paragraph_id,
            text_document: document_pk,
            agenda_item: ai_pk,
        };
        if let Some(paragraph_pk) = ex.emit(path, EntityKind::TextParagraph, &paragraph)? {
            scope
                .paragraphs
                .insert((ai_pk, paragraph_id - 1), paragraph_pk);
        }
    }
    Ok(())
}

/// Exactly one of author or meeting group. A system-user creator is
/// represented by the meeting group that stands in for it.
fn authorship(
    ex: &mut Exporter<'_>,
    scope: &MeetingScope,
    path: &str,
    what: &str,
    creators: &[String],
) -> Result<Option<Authorship>, Halt> {
    let creator = creators.first();
    let resolved = match creator {
        Some(userid) => match scope.system_groups.get(&userid.to_lowercase()) {
            Some(&group) => Some(Authorship::MeetingGroup(group)),
            None => ex
                .member(scope, path, userid, None)?
                .map(Authorship::Author),
        },
        None => None,
    };
    if resolved.is_none() {
        ex.ledger.critical(
            path,
            Diagnostic::new(
                ErrorCode::AuthorConflict,
                format!(
                    "{what} userid error, either author or meeting group needed. Author was: {}",
                    creator.map_or("(none)", String::as_str)
                ),
            ),
        )?;
    }
    Ok(resolved)
}

fn report_truncations(
    ex: &mut Exporter<'_>,
    path: &str,
    found: Vec<(TagOrigin, String)>,
) -> Result<(), Halt> {
    if !ex.config.report_truncated_tags {
        return Ok(());
    }
    for (origin, tag) in found {
        let message = match origin {
            TagOrigin::Aid => format!("AID tag too long, will be truncated: {tag}"),
            TagOrigin::Tag => format!("Tag too long: {tag}"),
        };
        ex.ledger
            .report(path, Diagnostic::new(ErrorCode::TagTruncated, message))?;
    }
    Ok(())
}

fn mentions(
    ex: &mut Exporter<'_>,
    scope: &MeetingScope,
    path: &str,
    userids: &[String],
) -> Result<Vec<Pk>, Halt> {
    let mut pks = Vec::with_capacity(userids.len());
    for userid in userids {
        if let Some(pk) = ex.member(scope, path, userid, Some("in mentions"))? {
            pks.push(pk);
        }
    }
    Ok(pks)
}

fn collect_likes(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    path: &str,
    content_type: [&'static str; 2],
    object_id: Pk,
    agenda_item: Pk,
    likes: &[String],
) -> Result<(), Halt> {
    for userid in likes {
        if let Some(user) = ex.member(scope, path, userid, None)? {
            scope.reactions.push(PendingReaction {
                content_type,
                object_id,
                user,
                agenda_item,
            });
        }
    }
    Ok(())
}

fn export_proposal(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    ai_path: &str,
    ai_pk: Pk,
    proposal: &Proposal,
) -> Result<(), Halt> {
    let path = format!("{ai_path}/{}", proposal.uid);
    let Some(authorship) = authorship(ex, scope, &path, "Proposal", &proposal.creators)? else {
        return Ok(());
    };

    let mut aid = proposal.aid.clone();
    let mut tags = proposal.tags.clone();
    let mut text = proposal.text.clone();
    let found = ex.tags.adjust(Some(&mut aid), &mut tags, &mut text);
    report_truncations(ex, &path, found)?;

    if text.contains('\0') {
        ex.ledger.critical(
            &path,
            Diagnostic::new(
                ErrorCode::InvalidText,
                "Proposal contains invalid unicode NULL char",
            ),
        )?;
    }
    let mut body = ex.convert_body(&text);
    if proposal.diff_text_para.is_none() {
        body = ex.richtext.add_paras(&body);
    }

    if !scope.prop_ids.entry(ai_pk).or_default().insert(aid.clone()) {
        ex.ledger.critical(
            &path,
            Diagnostic::new(
                ErrorCode::DuplicateProposalId,
                format!("Duplicate aid / prop_id: {aid}"),
            ),
        )?;
    }
    let mentions = mentions(ex, scope, &path, &proposal.mentions)?;

    let fields = ProposalFields {
        modified: proposal.modified,
        created: proposal.created,
        body,
        state: proposal.state.clone(),
        prop_id: aid,
        agenda_item: ai_pk,
        tags,
        mentions,
        authorship,
    };
    let Some(pk) = ex.emit(&path, EntityKind::Proposal, &fields)? else {
        return Ok(());
    };
    ex.registry
        .bind(EntityKind::Proposal, &proposal.uid, pk, Some(scope.pk));
    collect_likes(ex, scope, &path, PROPOSAL_TYPE, pk, ai_pk, &proposal.likes)?;

    let Some(index) = proposal.diff_text_para else {
        return Ok(());
    };
    let Some(&paragraph) = scope.paragraphs.get(&(ai_pk, index)) else {
        debug!(path = %path, index, "diff proposal without paragraph");
        ex.ledger.report(
            &path,
            Diagnostic::new(
                ErrorCode::UnresolvedReference,
                format!("Diff proposal points to missing paragraph {index}"),
            ),
        )?;
        return Ok(());
    };
    // A diff proposal shares its proposal's pk.
    let emitted = ex
        .stream
        .emit_at(EntityKind::DiffProposal, pk, &DiffProposalFields { paragraph });
    ex.settle(&path, emitted)?;
    Ok(())
}

fn export_discussion_post(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    ai_path: &str,
    ai_pk: Pk,
    post: &DiscussionPost,
) -> Result<(), Halt> {
    let path = format!("{ai_path}/{}", post.uid);
    let Some(authorship) = authorship(ex, scope, &path, "DiscussionPost", &post.creators)? else {
        return Ok(());
    };

    let mut tags = post.tags.clone();
    let mut text = post.text.clone();
    let found = ex.tags.adjust(None, &mut tags, &mut text);
    report_truncations(ex, &path, found)?;

    let body = ex.convert_body(&text);
    let body = ex.richtext.add_paras(&body);
    let mentions = mentions(ex, scope, &path, &post.mentions)?;

    let fields = DiscussionPostFields {
        modified: post.modified,
        created: post.created,
        body,
        tags,
        mentions,
        agenda_item: ai_pk,
        authorship,
    };
    let Some(pk) = ex.emit(&path, EntityKind::DiscussionPost, &fields)? else {
        return Ok(());
    };
    collect_likes(ex, scope, &path, DISCUSSION_POST_TYPE, pk, ai_pk, &post.likes)
}
