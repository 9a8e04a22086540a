//! Writes an authoritative vote outcome back into the page.

use crate::config::VoteConfig;
use crate::locate::Locator;
use crate::model::PostId;
use crate::model::VoteDirection;
use crate::model::VoteOutcome;
use tl_dom::Document;
use tracing::trace;

/// Sets the post's counter to `total_votes` and restyles both direction
/// buttons from `user_vote`. Nodes missing from the page are skipped.
pub fn apply_outcome(
    document: &mut Document,
    config: &VoteConfig,
    post_id: &PostId,
    outcome: VoteOutcome,
) {
    let (counter, buttons) = {
        let locator = Locator::new(document, config);
        let buttons = VoteDirection::ALL.map(|direction| (direction, locator.button(post_id, direction)));
        (locator.counter(post_id), buttons)
    };

    match counter {
        Some(counter) => {
            let target = document
                .first_descendant_by_tag(counter, &config.counter_emphasis_tag)
                .unwrap_or(counter);
            if let Err(error) = document.set_text_content(target, &outcome.total_votes.to_string()) {
                trace!(%error, %post_id, "vote counter not updated");
            }
        }
        None => trace!(%post_id, "no vote counter on page"),
    }

    let active = outcome.user_vote.active_direction();
    for (direction, button) in buttons {
        let Some(button) = button else {
            continue;
        };
        let classes = config.button_classes(direction);
        if active == Some(direction) {
            document.remove_class(button, &classes.inactive);
            document.add_class(button, &classes.active);
        } else {
            document.remove_class(button, &classes.active);
            document.add_class(button, &classes.inactive);
        }
    }
}
