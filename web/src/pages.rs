//! HTML pages.
//!
//! The three browsing pages implement [`PageRenderer`] so the render cache
//! can refresh them in the background. The rest are small static or
//! per-request pages.

use boxoffice_core::{ArtistId, Catalog, SaleSummary, TicketId};
use boxoffice_runtime::{InventoryView, PageRenderer};
use std::fmt::Write;

/// Rows and columns of every hall. Seat labels run `00-00` to `63-63`.
pub const HALL_SIZE: usize = 64;

/// Escape text for HTML element and attribute content.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title} | Box Office</title>\n</head>\n<body>\n\
         <header><a href=\"/\">Box Office</a></header>\n\
         <main id=\"content\">\n{body}</main>\n</body>\n</html>\n",
        title = escape(title),
    )
}

fn recent_sales(out: &mut String, sales: &[SaleSummary]) {
    out.push_str("<aside id=\"recent-sales\">\n<h2>Recent sales</h2>\n<ol>\n");
    for sale in sales {
        let _ = writeln!(
            out,
            "<li><span class=\"artist\">{}</span> <span class=\"ticket\">{}</span> \
             <span class=\"variation\">{}</span> <span class=\"seat\">{}</span></li>",
            escape(&sale.artist_name),
            escape(&sale.ticket_name),
            escape(&sale.variation_name),
            escape(&sale.seat_label),
        );
    }
    out.push_str("</ol>\n</aside>\n");
}

/// `GET /`: artists and recent sales.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopPage;

impl PageRenderer for TopPage {
    type Key = ();

    fn kind(&self) -> &'static str {
        "top"
    }

    fn keys(&self, _view: &InventoryView) -> Vec<()> {
        vec![()]
    }

    fn exists(&self, _catalog: &Catalog, (): ()) -> bool {
        true
    }

    fn needs_seat_map(&self) -> bool {
        false
    }

    fn render(&self, view: &InventoryView, (): ()) -> Option<String> {
        let mut body = String::from("<h1>Artists</h1>\n<ul id=\"artists\">\n");
        for artist in view.catalog().artists() {
            let _ = writeln!(
                body,
                "<li><a href=\"/artist/{}\">{}</a></li>",
                artist.id,
                escape(&artist.name)
            );
        }
        body.push_str("</ul>\n");
        recent_sales(&mut body, view.recent_sales());
        Some(layout("Top", &body))
    }
}

/// `GET /artist/:id`: the artist's tickets with unsold seat counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtistPage;

impl PageRenderer for ArtistPage {
    type Key = ArtistId;

    fn kind(&self) -> &'static str {
        "artist"
    }

    fn keys(&self, view: &InventoryView) -> Vec<ArtistId> {
        view.catalog().artists().iter().map(|a| a.id).collect()
    }

    fn exists(&self, catalog: &Catalog, key: ArtistId) -> bool {
        catalog.artist(key).is_some()
    }

    fn needs_seat_map(&self) -> bool {
        false
    }

    fn render(&self, view: &InventoryView, key: ArtistId) -> Option<String> {
        let artist = view.catalog().artist(key)?;

        let mut body = format!("<h1>{}</h1>\n<ul id=\"tickets\">\n", escape(&artist.name));
        for ticket in &artist.tickets {
            let _ = writeln!(
                body,
                "<li><a href=\"/ticket/{}\">{}</a> <span class=\"count\">{}</span> seats left</li>",
                ticket.id,
                escape(&ticket.name),
                view.remaining_for_ticket(ticket.id)
            );
        }
        body.push_str("</ul>\n");
        recent_sales(&mut body, view.recent_sales());
        Some(layout(&artist.name, &body))
    }
}

/// `GET /ticket/:id`: one seat map and buy form per variation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketPage;

impl PageRenderer for TicketPage {
    type Key = TicketId;

    fn kind(&self) -> &'static str {
        "ticket"
    }

    fn keys(&self, view: &InventoryView) -> Vec<TicketId> {
        view.catalog().tickets().map(|t| t.id).collect()
    }

    fn exists(&self, catalog: &Catalog, key: TicketId) -> bool {
        catalog.ticket(key).is_some()
    }

    fn render(&self, view: &InventoryView, key: TicketId) -> Option<String> {
        let catalog = view.catalog();
        let ticket = catalog.ticket(key)?;
        let artist = catalog.artist(ticket.artist_id)?;

        let mut body = format!(
            "<h1><a href=\"/artist/{}\">{}</a> : {}</h1>\n",
            artist.id,
            escape(&artist.name),
            escape(&ticket.name)
        );

        for variation in &ticket.variations {
            let _ = writeln!(
                body,
                "<section class=\"variation\" id=\"variation-{id}\">\n<h2>{name}</h2>\n\
                 <p>Seats left: <span class=\"vacancy\">{vacancy}</span></p>",
                id = variation.id,
                name = escape(&variation.name),
                vacancy = view.remaining(variation.id),
            );

            body.push_str("<table class=\"seats\">\n");
            for row in 0..HALL_SIZE {
                body.push_str("<tr>");
                for col in 0..HALL_SIZE {
                    let seat = format!("{row:02}-{col:02}");
                    let class = if view.is_available(variation.id, &seat) {
                        "available"
                    } else {
                        "unavailable"
                    };
                    let _ = write!(body, "<td id=\"{seat}\" class=\"{class}\"></td>");
                }
                body.push_str("</tr>\n");
            }
            body.push_str("</table>\n");

            let _ = writeln!(
                body,
                "<form method=\"POST\" action=\"/buy\">\n\
                 <input type=\"hidden\" name=\"variation_id\" value=\"{}\">\n\
                 <input type=\"text\" name=\"member_id\" placeholder=\"member id\">\n\
                 <button type=\"submit\">Buy</button>\n</form>\n</section>",
                variation.id
            );
        }

        recent_sales(&mut body, view.recent_sales());
        Some(layout(&ticket.name, &body))
    }
}

/// Purchase confirmation.
#[must_use]
pub fn complete(member_id: &str, seat_label: &str) -> String {
    let body = format!(
        "<h1>Thank you!</h1>\n<p>Member <span class=\"member\">{}</span> \
         bought seat <span class=\"seat\">{}</span>.</p>\n",
        escape(member_id),
        escape(seat_label)
    );
    layout("Complete", &body)
}

/// The variation has no seats left (or does not exist).
#[must_use]
pub fn sold_out() -> String {
    layout("Sold out", "<h1>Sold out</h1>\n<p>There are no seats left.</p>\n")
}

/// Admin page with the reset button.
#[must_use]
pub fn admin() -> String {
    layout(
        "Admin",
        "<h1>Admin</h1>\n\
         <form method=\"POST\" action=\"/admin\">\n\
         <button type=\"submit\">Reset data</button>\n</form>\n\
         <p><a href=\"/admin/order.csv\">Download orders (CSV)</a></p>\n",
    )
}

/// Unknown artist or ticket.
#[must_use]
pub fn not_found() -> String {
    layout("Not found", "<h1>Not found</h1>\n")
}

/// Generic failure page, without details.
#[must_use]
pub fn failure() -> String {
    layout("Error", "<h1>Something went wrong</h1>\n<p>Please try again later.</p>\n")
}
