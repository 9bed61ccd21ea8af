//! One handler per [`BeaconKind`].
//!
//! Handlers turn domain failures into [`ScanUi`] payloads and never return
//! `Err`. They describe the XP they want credited as an [`XpGrant`]; the
//! engine performs the ledger write so every kind shares the same
//! timeout and degradation rules.

use chrono::NaiveDate;
use serde_json::json;

use super::{actions, ScanMode, ScanRequest, ScanUi};
use crate::beacon::Beacon;
use crate::error::StoreError;
use crate::geo::GeoResult;
use crate::ledger::{keys, reasons};
use crate::models::{Notification, ResaleOutcome, Reservation};
use crate::ports::{Notifier, PaymentVerifier, Stores};
use crate::registry::{BeaconKind, BeaconTypeMeta, CARE_XP};
use crate::status::{ListingStatus, ResaleStatus, TicketStatus};
use crate::types::{DbId, Xp};

const CARE_MESSAGE: &str =
    "You're not alone. Care staff are nearby and this conversation stays private.";

/// XP a handler wants credited.
#[derive(Debug, Clone, PartialEq)]
pub struct XpGrant {
    pub user_id: DbId,
    pub amount: Xp,
    pub dedupe_key: String,
    pub reason: &'static str,
    pub metadata: serde_json::Value,
}

/// What a handler decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub ok: bool,
    pub action: &'static str,
    pub ui: ScanUi,
    pub xp: Option<XpGrant>,
    /// Whether the scan consumed the beacon (counts toward `scan_limit`).
    pub counted: bool,
}

impl Routed {
    fn view(action: &'static str, ui: ScanUi) -> Self {
        Self { ok: true, action, ui, xp: None, counted: false }
    }

    fn effect(action: &'static str, ui: ScanUi, xp: Option<XpGrant>) -> Self {
        Self { ok: true, action, ui, xp, counted: true }
    }

    fn auth_required(action: &'static str, reason: &'static str) -> Self {
        Self { ok: false, action, ui: ScanUi::AuthRequired { reason }, xp: None, counted: false }
    }

    fn not_found(action: &'static str, entity: &'static str) -> Self {
        Self::view(action, ScanUi::NotFound { entity })
    }

    fn retry_later(action: &'static str, reason: &'static str, err: &StoreError) -> Self {
        tracing::error!(error = %err, action, "Datastore failure while routing scan");
        Self { ok: false, action, ui: ScanUi::RetryLater { reason }, xp: None, counted: false }
    }
}

/// Everything a handler may read.
pub struct HandlerCtx<'a> {
    pub stores: &'a Stores,
    pub verifier: &'a dyn PaymentVerifier,
    pub notifier: &'a dyn Notifier,
    pub beacon: &'a Beacon,
    pub meta: &'static BeaconTypeMeta,
    pub request: &'a ScanRequest,
    pub geo: GeoResult,
}

impl HandlerCtx<'_> {
    fn day(&self) -> NaiveDate {
        self.request.scanned_at.date_naive()
    }

    fn beacon_xp(&self) -> Xp {
        self.beacon.xp_amount(self.meta.default_xp)
    }

    fn grant(&self, user_id: DbId, amount: Xp, dedupe_key: String, reason: &'static str) -> XpGrant {
        XpGrant {
            user_id,
            amount,
            dedupe_key,
            reason,
            metadata: json!({
                "beacon_id": self.beacon.id,
                "beacon_code": self.beacon.code,
                "source": self.request.source.as_str(),
            }),
        }
    }
}

/// Whether a scan of `kind` in `mode` can perform an effect, and so takes a
/// per-user daily quota unit. The unit is given back when the handler ends
/// up doing nothing.
pub fn is_effectful(kind: BeaconKind, mode: ScanMode) -> bool {
    match kind {
        BeaconKind::Checkin | BeaconKind::PersonConnect | BeaconKind::Room | BeaconKind::Care => {
            true
        }
        BeaconKind::Ticket => mode == ScanMode::Validate,
        BeaconKind::TicketResale | BeaconKind::Product => mode == ScanMode::Purchase,
    }
}

/// Dispatch to the handler for `kind`.
pub async fn route(kind: BeaconKind, ctx: &HandlerCtx<'_>) -> Routed {
    match kind {
        BeaconKind::Checkin => checkin(ctx),
        BeaconKind::Ticket => ticket(ctx).await,
        BeaconKind::TicketResale => ticket_resale(ctx).await,
        BeaconKind::Product => product(ctx).await,
        BeaconKind::PersonConnect => person_connect(ctx).await,
        BeaconKind::Room => room(ctx).await,
        BeaconKind::Care => care(ctx),
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

fn checkin(ctx: &HandlerCtx<'_>) -> Routed {
    let ui = ScanUi::Checkin { inside_venue: ctx.geo.inside_venue, geo: ctx.geo.class };
    match ctx.request.user_id {
        Some(user_id) if ctx.geo.inside_venue => {
            let key = keys::checkin(ctx.beacon.id, user_id, ctx.day());
            let grant = ctx.grant(user_id, ctx.beacon_xp(), key, reasons::CHECKIN);
            Routed::effect(actions::CHECKIN, ui, Some(grant))
        }
        _ => Routed::view(actions::CHECKIN, ui),
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// View or validate a ticket at the door.
///
/// Validation XP belongs to the ticket holder, not to the staff member
/// scanning it, so the grant targets `ticket.owner_id` and the scanner's
/// response reports it only when the two are the same person.
async fn ticket(ctx: &HandlerCtx<'_>) -> Routed {
    let validating = ctx.request.mode == ScanMode::Validate;
    let action = if validating { actions::TICKET_VALIDATE } else { actions::TICKET_VIEW };

    let Some(ticket_id) = ctx.request.ticket_id else {
        return Routed::not_found(action, "ticket");
    };
    let ticket = match ctx.stores.tickets.find(ticket_id).await {
        Ok(Some(t)) => t,
        Ok(None) => return Routed::not_found(action, "ticket"),
        Err(e) => return Routed::retry_later(action, "ticket_lookup_failed", &e),
    };

    if ctx.beacon.target_ref.is_some_and(|event_id| event_id != ticket.event_id) {
        return Routed::view(
            action,
            ScanUi::TicketInvalid { ticket_id, status: "wrong_event".into() },
        );
    }

    if !validating {
        return Routed::view(
            action,
            ScanUi::TicketView { ticket_id, event_id: ticket.event_id, status: ticket.status },
        );
    }

    let Some(staff_id) = ctx.request.user_id else {
        return Routed::auth_required(action, "ticket_validation_requires_login");
    };
    if ticket.status != TicketStatus::Valid {
        return Routed::view(
            action,
            ScanUi::TicketInvalid { ticket_id, status: ticket.status.to_string() },
        );
    }

    match ctx
        .stores
        .tickets
        .mark_scanned(ticket_id, Some(staff_id), ctx.beacon.id, ctx.request.scanned_at)
        .await
    {
        Ok(true) => {
            tracing::info!(ticket_id, beacon_id = ctx.beacon.id, staff_id, "Ticket validated");
            let grant = ctx.grant(
                ticket.owner_id,
                ctx.beacon_xp(),
                keys::ticket_entry(ticket_id),
                reasons::TICKET_ENTRY,
            );
            Routed::effect(
                action,
                ScanUi::TicketValidated { ticket_id, event_id: ticket.event_id },
                Some(grant),
            )
        }
        // Lost a race with another door scanner; report the state that won.
        Ok(false) => {
            let status = match ctx.stores.tickets.find(ticket_id).await {
                Ok(Some(t)) => t.status,
                _ => TicketStatus::Scanned,
            };
            Routed::view(action, ScanUi::TicketInvalid { ticket_id, status: status.to_string() })
        }
        Err(e) => Routed::retry_later(action, "ticket_state_unconfirmed", &e),
    }
}

async fn ticket_resale(ctx: &HandlerCtx<'_>) -> Routed {
    let purchasing = ctx.request.mode == ScanMode::Purchase;
    let action = if purchasing { actions::RESALE_PURCHASE } else { actions::RESALE_VIEW };

    let Some(resale_id) = ctx.beacon.target_ref else {
        return Routed::not_found(action, "resale");
    };
    let resale = match ctx.stores.resales.find(resale_id).await {
        Ok(Some(r)) => r,
        Ok(None) => return Routed::not_found(action, "resale"),
        Err(e) => return Routed::retry_later(action, "resale_lookup_failed", &e),
    };

    if !purchasing {
        return Routed::view(
            action,
            ScanUi::ResaleView {
                resale_id,
                ticket_id: resale.ticket_id,
                price_cents: resale.price_cents,
                currency: resale.currency,
                status: resale.status,
            },
        );
    }

    let Some(buyer_id) = ctx.request.user_id else {
        return Routed::auth_required(action, "purchase_requires_login");
    };
    if resale.status != ResaleStatus::Active {
        return Routed::view(action, ScanUi::ResaleUnavailable { resale_id, reason: "not_active" });
    }
    if resale.seller_id == buyer_id {
        return Routed::view(action, ScanUi::ResaleUnavailable { resale_id, reason: "own_listing" });
    }
    let intent_id = match confirm_payment(ctx, resale.price_cents, &resale.currency).await {
        Ok(id) => id,
        Err(routed) => return routed.with_action(action),
    };

    match ctx
        .stores
        .resales
        .complete(resale_id, buyer_id, &intent_id, ctx.request.scanned_at)
        .await
    {
        Ok(ResaleOutcome::Completed(done)) => {
            tracing::info!(
                resale_id,
                buyer_id,
                seller_id = done.seller_id,
                new_ticket_id = done.new_ticket_id,
                "Resale completed"
            );
            ctx.notifier.notify(
                Notification::new("ticket.transferred")
                    .to(done.seller_id)
                    .about("resale", resale_id)
                    .with_payload(json!({
                        "buyer_id": buyer_id,
                        "old_ticket_id": done.old_ticket_id,
                        "new_ticket_id": done.new_ticket_id,
                    })),
            );
            let grant = ctx.grant(
                buyer_id,
                ctx.beacon_xp(),
                keys::resale_purchase(resale_id),
                reasons::RESALE_PURCHASE,
            );
            Routed::effect(
                action,
                ScanUi::ResaleCompleted { resale_id, ticket_id: done.new_ticket_id },
                Some(grant),
            )
        }
        Ok(ResaleOutcome::NotActive) => {
            Routed::view(action, ScanUi::ResaleUnavailable { resale_id, reason: "not_active" })
        }
        Ok(ResaleOutcome::TicketNotValid) => {
            Routed::view(action, ScanUi::ResaleUnavailable { resale_id, reason: "ticket_not_valid" })
        }
        Ok(ResaleOutcome::PaymentUsed) => payment_used(action, &intent_id),
        Err(e) => Routed::retry_later(action, "resale_transfer_unconfirmed", &e),
    }
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

async fn product(ctx: &HandlerCtx<'_>) -> Routed {
    let purchasing = ctx.request.mode == ScanMode::Purchase;
    let action = if purchasing { actions::PRODUCT_PURCHASE } else { actions::PRODUCT_VIEW };

    let Some(listing_id) = ctx.beacon.target_ref else {
        return Routed::not_found(action, "listing");
    };
    let listing = match ctx.stores.listings.find(listing_id).await {
        Ok(Some(l)) => l,
        Ok(None) => return Routed::not_found(action, "listing"),
        Err(e) => return Routed::retry_later(action, "listing_lookup_failed", &e),
    };
    let sold_out = listing.status == ListingStatus::SoldOut || listing.stock <= 0;

    if !purchasing {
        return Routed::view(
            action,
            ScanUi::ProductView {
                listing_id,
                title: listing.title,
                price_cents: listing.price_cents,
                currency: listing.currency,
                stock: listing.stock.max(0),
                sold_out,
            },
        );
    }

    let Some(buyer_id) = ctx.request.user_id else {
        return Routed::auth_required(action, "purchase_requires_login");
    };
    if sold_out {
        return Routed::view(action, ScanUi::SoldOut { listing_id });
    }
    if listing.status != ListingStatus::Active {
        return Routed::view(action, ScanUi::ListingClosed { listing_id });
    }
    let intent_id = match confirm_payment(ctx, listing.price_cents, &listing.currency).await {
        Ok(id) => id,
        Err(routed) => return routed.with_action(action),
    };

    match ctx
        .stores
        .listings
        .reserve(listing_id, buyer_id, Some(ctx.beacon.id), &intent_id)
        .await
    {
        Ok(Reservation::Reserved(order)) => {
            tracing::info!(listing_id, order_id = order.id, buyer_id, "Listing unit reserved");
            let grant = ctx.grant(
                buyer_id,
                ctx.beacon_xp(),
                keys::product_purchase(ctx.beacon.id, &intent_id),
                reasons::PRODUCT_PURCHASE,
            );
            Routed::effect(
                action,
                ScanUi::PurchaseReserved { listing_id, order_id: order.id },
                Some(grant),
            )
        }
        Ok(Reservation::SoldOut) => Routed::view(action, ScanUi::SoldOut { listing_id }),
        Ok(Reservation::NotActive) => Routed::view(action, ScanUi::ListingClosed { listing_id }),
        Ok(Reservation::PaymentUsed) => payment_used(action, &intent_id),
        Err(e) => Routed::retry_later(action, "reservation_unconfirmed", &e),
    }
}

/// Check that the request carries a succeeded payment intent covering
/// `price_cents` in `currency`. The error branch is a ready-made response.
async fn confirm_payment(
    ctx: &HandlerCtx<'_>,
    price_cents: i64,
    currency: &str,
) -> Result<String, Routed> {
    let Some(intent_id) = ctx.request.payment_intent_id.clone() else {
        return Err(Routed::view("", ScanUi::PaymentRequired { reason: "payment_intent_required" }));
    };
    let intent = match ctx.verifier.verify(&intent_id).await {
        Ok(Some(intent)) if intent.succeeded => intent,
        Ok(_) => {
            return Err(Routed::view("", ScanUi::PaymentRequired { reason: "payment_not_confirmed" }))
        }
        Err(e) => return Err(Routed::retry_later("", "payment_verification_failed", &e)),
    };
    if !intent.currency.eq_ignore_ascii_case(currency) {
        tracing::warn!(
            payment_intent_id = %intent_id,
            paid_currency = %intent.currency,
            currency,
            "Payment intent currency does not match price"
        );
        return Err(Routed::view("", ScanUi::PaymentRequired { reason: "currency_mismatch" }));
    }
    if intent.amount_cents < price_cents {
        tracing::warn!(
            payment_intent_id = %intent_id,
            paid = intent.amount_cents,
            price_cents,
            "Payment intent does not cover price"
        );
        return Err(Routed::view("", ScanUi::PaymentRequired { reason: "amount_mismatch" }));
    }
    Ok(intent_id)
}

fn payment_used(action: &'static str, intent_id: &str) -> Routed {
    tracing::warn!(payment_intent_id = %intent_id, action, "Payment intent already spent");
    Routed::view(action, ScanUi::PaymentRequired { reason: "payment_already_used" })
}

impl Routed {
    fn with_action(mut self, action: &'static str) -> Self {
        self.action = action;
        self
    }
}

// ---------------------------------------------------------------------------
// Social
// ---------------------------------------------------------------------------

async fn person_connect(ctx: &HandlerCtx<'_>) -> Routed {
    let owner_id = ctx.beacon.owner_id;
    let Some(user_id) = ctx.request.user_id else {
        return Routed::auth_required(actions::CONNECT_REQUEST, "connect_requires_login");
    };

    if user_id == owner_id {
        return match ctx.stores.connections.pending_for(owner_id).await {
            Ok(pending) => Routed::view(
                actions::CONNECT_OWNER_VIEW,
                ScanUi::ConnectOwnerView { pending_requests: pending },
            ),
            Err(e) => Routed::retry_later(actions::CONNECT_OWNER_VIEW, "connections_unavailable", &e),
        };
    }

    match ctx.stores.connections.request(user_id, owner_id, ctx.beacon.id).await {
        Ok((request, created)) => {
            if created {
                ctx.notifier.notify(
                    Notification::new("connection.requested")
                        .to(owner_id)
                        .about("connection_request", request.id)
                        .with_payload(json!({ "from_user_id": user_id })),
                );
            }
            let ui = ScanUi::ConnectRequested {
                request_id: request.id,
                to_user_id: owner_id,
                status: request.status,
                already_requested: !created,
            };
            let grant = ctx.grant(
                user_id,
                ctx.beacon_xp(),
                keys::connect(user_id, owner_id),
                reasons::CONNECT,
            );
            Routed { counted: created, ..Routed::effect(actions::CONNECT_REQUEST, ui, Some(grant)) }
        }
        Err(e) => Routed::retry_later(actions::CONNECT_REQUEST, "connections_unavailable", &e),
    }
}

async fn room(ctx: &HandlerCtx<'_>) -> Routed {
    let Some(room_id) = ctx.beacon.target_ref else {
        return Routed::not_found(actions::ROOM_JOIN, "room");
    };
    let Some(user_id) = ctx.request.user_id else {
        return Routed::auth_required(actions::ROOM_JOIN, "room_requires_login");
    };

    match ctx.stores.rooms.join(room_id, user_id).await {
        Ok(join) => {
            let ui = ScanUi::RoomJoined {
                room_id,
                member_count: join.member_count,
                newly_joined: join.newly_joined,
            };
            let grant = ctx.grant(
                user_id,
                ctx.beacon_xp(),
                keys::room_join(room_id, user_id),
                reasons::ROOM_JOIN,
            );
            Routed { counted: join.newly_joined, ..Routed::effect(actions::ROOM_JOIN, ui, Some(grant)) }
        }
        Err(e) => Routed::retry_later(actions::ROOM_JOIN, "room_unavailable", &e),
    }
}

// ---------------------------------------------------------------------------
// Care
// ---------------------------------------------------------------------------

/// Harm-reduction access: no login, no preconditions, fixed XP.
fn care(ctx: &HandlerCtx<'_>) -> Routed {
    let xp = ctx.request.user_id.map(|user_id| {
        ctx.grant(user_id, CARE_XP, keys::care(ctx.beacon.id, user_id, ctx.day()), reasons::CARE)
    });
    Routed::effect(actions::CARE_ACCESS, ScanUi::Care { message: CARE_MESSAGE }, xp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effectful_modes() {
        assert!(is_effectful(BeaconKind::Checkin, ScanMode::View));
        assert!(is_effectful(BeaconKind::Care, ScanMode::View));
        assert!(!is_effectful(BeaconKind::Ticket, ScanMode::View));
        assert!(is_effectful(BeaconKind::Ticket, ScanMode::Validate));
        assert!(!is_effectful(BeaconKind::Product, ScanMode::View));
        assert!(is_effectful(BeaconKind::Product, ScanMode::Purchase));
        assert!(is_effectful(BeaconKind::TicketResale, ScanMode::Purchase));
    }
}
